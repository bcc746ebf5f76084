use crate::{
    error::ChimeError,
    message::{IncomingMessage, OutgoingMessage},
};
use async_trait::async_trait;

/// Messaging channel trait.
///
/// Every messaging platform (Telegram today, others later) implements this
/// trait to receive and send messages. The dialog engine and the reminder
/// dispatcher only ever talk to this trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, ChimeError>;

    /// Send a message through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), ChimeError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), ChimeError>;
}
