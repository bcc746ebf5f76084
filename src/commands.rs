//! The bot's slash commands.

/// Known bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Login,
    Logout,
    List,
    Remind,
}

impl Command {
    /// Parse a command from message text.
    ///
    /// Matching is exact and case-sensitive on the first
    /// whitespace-separated token; a Telegram `@botname` suffix is stripped
    /// (e.g. `/list@chime_bot`). Returns `None` for anything else,
    /// including unknown `/` prefixes.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let cmd = first.split('@').next().unwrap_or(first);
        match cmd {
            "/start" => Some(Self::Start),
            "/login" => Some(Self::Login),
            "/logout" => Some(Self::Logout),
            "/list" => Some(Self::List),
            "/remind" => Some(Self::Remind),
            _ => None,
        }
    }
}
