//! # chime-core
//!
//! Core types, traits, configuration, and error handling for the chime bot.

pub mod config;
pub mod datetime;
pub mod error;
pub mod message;
pub mod session;
pub mod traits;
