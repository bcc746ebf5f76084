use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse user-supplied date and time in the `DD.MM.YYYY HH:MM` form into a
/// UTC instant.
///
/// The shape is strict: two-digit day, month, hour and minute, four-digit
/// year, ASCII digits only. Calendar-impossible combinations (31.04,
/// 30.02.2025, hour 24, minute 60) are rejected. Anything else returns
/// `None` too.
pub fn parse(text: &str) -> Option<DateTime<Utc>> {
    let (date, time) = text.split_once(' ')?;

    let mut parts = date.split('.');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let (hour, minute) = time.split_once(':')?;

    let day = field(day, 2)?;
    let month = field(month, 2)?;
    let year = field(year, 4)?;
    let hour = field(hour, 2)?;
    let minute = field(minute, 2)?;

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// A fixed-width, all-ASCII-digit field. `"+1"` is not a two-digit number.
fn field(text: &str, width: usize) -> Option<u32> {
    if text.len() != width || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Render an instant in the storage-canonical `YYYY-MM-DD HH:MM:00` form.
///
/// Seconds are always zero. On this form, lexicographic order equals
/// chronological order, which the due-reminder query relies on.
pub fn format_storage(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:00").to_string()
}
