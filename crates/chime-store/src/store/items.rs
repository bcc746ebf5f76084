//! Per-user to-do items.
//!
//! Items are created and edited by external tooling (and the `add-task`
//! subcommand); the bot itself only reads them.

use super::Store;
use chime_core::error::ChimeError;

/// A to-do item.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: i64,
    pub text: String,
    pub done: bool,
}

impl Store {
    /// Add an item to a user's list.
    pub async fn create_item(&self, user_id: i64, text: &str) -> Result<i64, ChimeError> {
        let result = sqlx::query("INSERT INTO items (user_id, text) VALUES (?, ?)")
            .bind(user_id)
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| ChimeError::Store(format!("create item failed: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// A user's items in creation order. `/list` numbering and `/remind`
    /// task numbers both come from this order.
    pub async fn items_for_user(&self, user_id: i64) -> Result<Vec<Item>, ChimeError> {
        let rows: Vec<(i64, String, i64)> =
            sqlx::query_as("SELECT id, text, done FROM items WHERE user_id = ? ORDER BY id ASC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ChimeError::Store(format!("list items failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, text, done)| Item {
                id,
                text,
                done: done != 0,
            })
            .collect())
    }
}
