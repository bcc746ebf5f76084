//! Gateway — the main event loop connecting the channel, the store, and the
//! dialog engine.
//!
//! Includes: per-chat message ordering, the reminder scheduler, and
//! graceful shutdown.

mod auth;
mod dialog;
mod scheduler;

#[cfg(test)]
mod tests;

use chime_core::{
    config::SchedulerConfig,
    message::{IncomingMessage, OutgoingMessage},
    session::SessionStore,
    traits::Channel,
};
use chime_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// The central gateway that routes chat messages through the dialog engine
/// and dispatches due reminders.
pub struct Gateway {
    channel: Arc<dyn Channel>,
    store: Store,
    sessions: SessionStore,
    scheduler_config: SchedulerConfig,
    /// Chats with a message being processed. New messages are buffered here
    /// so each chat's dialog advances strictly in arrival order.
    active_chats: Mutex<HashMap<String, Vec<IncomingMessage>>>,
}

impl Gateway {
    /// Create a new gateway.
    pub fn new(channel: Arc<dyn Channel>, store: Store, scheduler_config: SchedulerConfig) -> Self {
        Self {
            channel,
            store,
            sessions: SessionStore::new(),
            scheduler_config,
            active_chats: Mutex::new(HashMap::new()),
        }
    }

    /// Run the main event loop.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "chime gateway running | channel: {} | scheduler: {}",
            self.channel.name(),
            if self.scheduler_config.enabled {
                "enabled"
            } else {
                "disabled"
            },
        );

        let mut rx = self.channel.start().await.map_err(|e| {
            anyhow::anyhow!("failed to start channel {}: {e}", self.channel.name())
        })?;
        info!("Channel started: {}", self.channel.name());

        // Spawn the reminder scheduler loop.
        let sched_handle = if self.scheduler_config.enabled {
            let sched_store = self.store.clone();
            let sched_channel = self.channel.clone();
            let poll_secs = self.scheduler_config.poll_interval_secs;
            Some(tokio::spawn(async move {
                Self::scheduler_loop(sched_store, sched_channel, poll_secs).await;
            }))
        } else {
            None
        };

        // Main event loop with graceful shutdown.
        loop {
            tokio::select! {
                Some(incoming) = rx.recv() => {
                    let gw = self.clone();
                    tokio::spawn(async move {
                        gw.dispatch_message(incoming).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // Graceful shutdown.
        if let Some(h) = &sched_handle {
            h.abort();
        }
        if let Err(e) = self.channel.stop().await {
            warn!("failed to stop channel {}: {e}", self.channel.name());
        }
        info!("Shutdown complete.");
        Ok(())
    }

    /// Dispatch a message: buffer if the chat is busy, otherwise process.
    async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        let chat_key = incoming.chat_id.clone();

        {
            let mut active = self.active_chats.lock().await;
            if let Some(buf) = active.get_mut(&chat_key) {
                // Chat already has a message being handled — queue behind it.
                buf.push(incoming);
                return;
            }
            // Mark chat as active (empty buffer).
            active.insert(chat_key.clone(), Vec::new());
        }

        // Process the message.
        self.handle_message(incoming).await;

        // Drain any buffered messages for this chat.
        loop {
            let next = {
                let mut active = self.active_chats.lock().await;
                let buffer = active.get_mut(&chat_key);
                match buffer {
                    Some(buf) if !buf.is_empty() => Some(buf.remove(0)),
                    _ => {
                        // No more buffered messages — remove chat from active.
                        active.remove(&chat_key);
                        None
                    }
                }
            };

            match next {
                Some(buffered_msg) => self.handle_message(buffered_msg).await,
                None => break,
            }
        }
    }

    /// Send a plain text reply to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) {
        let msg = OutgoingMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = self.channel.send(msg).await {
            error!("failed to send message to chat {chat_id}: {e}");
        }
    }
}
