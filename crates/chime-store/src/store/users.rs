//! User accounts and chat binding.

use super::Store;
use chime_core::error::ChimeError;

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    /// Chat currently bound for notifications, if any.
    pub chat_id: Option<String>,
}

impl Store {
    /// Create an account. Fails if the username is taken.
    pub async fn create_user(&self, username: &str, password: &str) -> Result<i64, ChimeError> {
        let result = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(password)
            .execute(&self.pool)
            .await
            .map_err(|e| ChimeError::Store(format!("create user failed: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// Look up an account by exact username.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, ChimeError> {
        let row: Option<(i64, String, String, Option<String>)> =
            sqlx::query_as("SELECT id, username, password, chat_id FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ChimeError::Store(format!("find user failed: {e}")))?;

        Ok(row.map(|(id, username, password, chat_id)| User {
            id,
            username,
            password,
            chat_id,
        }))
    }

    /// Bind a chat to one user, exclusively: any other account holding this
    /// chat id loses it first, then it is set on `user_id`.
    pub async fn bind_chat(&self, user_id: i64, chat_id: &str) -> Result<(), ChimeError> {
        sqlx::query("UPDATE users SET chat_id = NULL WHERE chat_id = ? AND id != ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ChimeError::Store(format!("unbind chat failed: {e}")))?;

        sqlx::query("UPDATE users SET chat_id = ? WHERE id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ChimeError::Store(format!("bind chat failed: {e}")))?;

        Ok(())
    }
}
