//! Reminder rows and the due query.

use super::Store;
use chime_core::{datetime, error::ChimeError};
use chrono::{DateTime, Utc};

/// A reminder that has come due, joined to what dispatch needs.
///
/// `chat_id` is `None` when the owner has no bound chat (or no longer
/// exists); `task_text` is `None` when the item was deleted out from under
/// the reminder.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: Option<String>,
    pub task_text: Option<String>,
}

impl Store {
    /// Schedule a reminder for an item.
    pub async fn create_reminder(
        &self,
        user_id: i64,
        item_id: i64,
        due_at: &DateTime<Utc>,
    ) -> Result<i64, ChimeError> {
        let result =
            sqlx::query("INSERT INTO reminders (user_id, item_id, due_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(item_id)
                .bind(datetime::format_storage(due_at))
                .execute(&self.pool)
                .await
                .map_err(|e| ChimeError::Store(format!("create reminder failed: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// Reminders due at or before `now`, oldest first.
    ///
    /// LEFT joins, so reminders whose owner or item vanished still come back;
    /// the dispatcher decides what to do with them. The comparison works on
    /// the storage-canonical text form, where lexicographic order equals
    /// chronological order.
    pub async fn due_reminders(&self, now: &DateTime<Utc>) -> Result<Vec<DueReminder>, ChimeError> {
        let rows: Vec<(i64, i64, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT r.id, r.user_id, u.chat_id, i.text \
             FROM reminders r \
             LEFT JOIN users u ON u.id = r.user_id \
             LEFT JOIN items i ON i.id = r.item_id \
             WHERE r.due_at <= ? \
             ORDER BY r.due_at ASC",
        )
        .bind(datetime::format_storage(now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChimeError::Store(format!("due reminders failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, chat_id, task_text)| DueReminder {
                id,
                user_id,
                chat_id,
                task_text,
            })
            .collect())
    }

    /// Delete a reminder once dispatch has dealt with it.
    pub async fn delete_reminder(&self, id: i64) -> Result<(), ChimeError> {
        sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| ChimeError::Store(format!("delete reminder failed: {e}")))?;
        Ok(())
    }

    /// A user's reminders as (id, item_id, due_at) rows, soonest first.
    pub async fn reminders_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<(i64, i64, String)>, ChimeError> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT id, item_id, due_at FROM reminders WHERE user_id = ? ORDER BY due_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChimeError::Store(format!("list reminders failed: {e}")))?;
        Ok(rows)
    }
}
