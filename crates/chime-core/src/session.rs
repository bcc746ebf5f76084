use std::collections::HashMap;
use std::sync::Mutex;

/// Where a conversation currently stands.
///
/// There is no `Anonymous` variant: a chat with no entry in the
/// [`SessionStore`] is anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// `/login` received, waiting for the username.
    AwaitingUsername,
    /// Username captured, waiting for the password.
    AwaitingPassword { username: String },
    /// Authenticated.
    LoggedIn { user_id: i64 },
    /// `/remind` received, waiting for `<task number> <date> <time>`.
    AwaitingReminderDetails { user_id: i64 },
}

/// In-memory conversation state, keyed by chat id.
///
/// Sessions are never persisted; a restart logs every chat out. Lock scopes
/// are short and never held across an await — ordering of mutations within
/// one chat is the gateway's job, not this map's.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Stage>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage for a chat, if any.
    pub fn get(&self, chat_id: &str) -> Option<Stage> {
        match self.inner.lock() {
            Ok(map) => map.get(chat_id).cloned(),
            Err(_) => None,
        }
    }

    /// Set (or replace) the stage for a chat.
    pub fn set(&self, chat_id: &str, stage: Stage) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(chat_id.to_string(), stage);
        }
    }

    /// Remove a chat's session. Returns whether one existed.
    pub fn clear(&self, chat_id: &str) -> bool {
        match self.inner.lock() {
            Ok(mut map) => map.remove(chat_id).is_some(),
            Err(_) => false,
        }
    }
}
