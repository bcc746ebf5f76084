//! Due reminder delivery.

use super::Gateway;
use chime_core::{error::ChimeError, message::OutgoingMessage, traits::Channel};
use chime_store::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

impl Gateway {
    /// Background task: dispatch due reminders every `poll_secs`.
    ///
    /// Cycles never overlap; a slow delivery pushes the next tick back
    /// instead of stacking a second cycle on top of it.
    pub(super) async fn scheduler_loop(store: Store, channel: Arc<dyn Channel>, poll_secs: u64) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(poll_secs)).await;

            if let Err(e) = Self::dispatch_due_reminders(&store, channel.as_ref()).await {
                error!("scheduler: dispatch cycle failed: {e}");
            }
        }
    }

    /// One dispatch cycle over everything due at or before now.
    ///
    /// Delivery is best effort. A reminder is deleted once it has been
    /// dealt with; only a failed send keeps the row for the next cycle, so
    /// a crash between send and delete can repeat a notification.
    pub(super) async fn dispatch_due_reminders(
        store: &Store,
        channel: &dyn Channel,
    ) -> Result<(), ChimeError> {
        let now = Utc::now();
        let due = store.due_reminders(&now).await?;

        for reminder in due {
            match (&reminder.chat_id, &reminder.task_text) {
                (Some(chat_id), Some(task_text)) => {
                    let msg = OutgoingMessage {
                        chat_id: chat_id.clone(),
                        text: format!("🔔 Reminder: \"{task_text}\""),
                    };
                    if let Err(e) = channel.send(msg).await {
                        // Keep the row; the next cycle retries.
                        error!("failed to deliver reminder {}: {e}", reminder.id);
                        continue;
                    }
                    info!("delivered reminder {} to chat {chat_id}", reminder.id);
                }
                (_, None) => {
                    // The task is gone; there is nothing sensible to send.
                    warn!(
                        "dropping reminder {} for user {}: task no longer exists",
                        reminder.id, reminder.user_id
                    );
                }
                (None, Some(_)) => {
                    debug!(
                        "discarding reminder {} for user {}: no chat bound",
                        reminder.id, reminder.user_id
                    );
                }
            }

            if let Err(e) = store.delete_reminder(reminder.id).await {
                error!("failed to delete reminder {}: {e}", reminder.id);
            }
        }

        Ok(())
    }
}
