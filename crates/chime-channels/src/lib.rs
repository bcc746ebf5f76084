//! # chime-channels
//!
//! Messaging platform integrations for chime.

pub mod telegram;

pub use telegram::TelegramChannel;
