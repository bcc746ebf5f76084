//! # chime-store
//!
//! SQLite-backed storage for chime (users, to-do items, reminders).

pub mod store;

pub use store::{DueReminder, Item, Store, User};
