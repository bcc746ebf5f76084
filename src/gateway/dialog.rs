//! The conversation state machine.
//!
//! Commands are handled first and may interrupt any stage. Free text is
//! interpreted by the chat's current stage; unknown `/` messages and free
//! text from chats without a session are dropped without a reply.

use super::Gateway;
use crate::commands::Command;
use chime_core::{datetime, message::IncomingMessage, session::Stage};
use tracing::{debug, error, info};

const REMINDER_USAGE: &str = "Send: <task number> <DD.MM.YYYY> <HH:MM>\nExample: 2 21.06.2025 23:30";
const STORE_HICCUP: &str = "Something went wrong on my end. Please try again.";

impl Gateway {
    /// Route one incoming message through commands and the dialog stages.
    pub(super) async fn handle_message(&self, incoming: IncomingMessage) {
        let chat_id = incoming.chat_id.clone();
        let text = incoming.text.trim().to_string();

        // Never echo credentials into the log.
        match self.sessions.get(&chat_id) {
            Some(Stage::AwaitingPassword { .. }) => {
                debug!("message from chat {chat_id}: <awaiting password, redacted>");
            }
            _ => debug!("message from chat {chat_id}: {:?}", preview(&text)),
        }

        if let Some(cmd) = Command::parse(&text) {
            self.handle_command(cmd, &chat_id).await;
            return;
        }

        // Unknown slash commands never feed the dialog.
        if text.starts_with('/') {
            debug!("ignoring unknown command from chat {chat_id}");
            return;
        }

        let Some(stage) = self.sessions.get(&chat_id) else {
            // Free text from a chat with no session.
            return;
        };

        match stage {
            Stage::AwaitingUsername => {
                self.sessions
                    .set(&chat_id, Stage::AwaitingPassword { username: text });
                self.send_text(&chat_id, "Now enter your password:").await;
            }
            Stage::AwaitingPassword { username } => {
                self.finish_login(&chat_id, &username, &text).await;
            }
            Stage::LoggedIn { .. } => {
                // Free chatter outside a flow gets no reply.
            }
            Stage::AwaitingReminderDetails { user_id } => {
                self.capture_reminder_details(&chat_id, user_id, &text).await;
            }
        }
    }

    /// Handle a recognized command in the context of the chat's stage.
    async fn handle_command(&self, cmd: Command, chat_id: &str) {
        match cmd {
            Command::Start => {
                self.send_text(
                    chat_id,
                    "Hi! I'm chime. I keep your to-do list and ping you when a task is due.\nSend /login to sign in.",
                )
                .await;
            }
            Command::Login => {
                // Restarts the login flow from any stage.
                self.sessions.set(chat_id, Stage::AwaitingUsername);
                self.send_text(chat_id, "Enter your username:").await;
            }
            Command::Logout => {
                if self.sessions.clear(chat_id) {
                    self.send_text(chat_id, "Signed out. See you!").await;
                } else {
                    self.send_text(chat_id, "You are not logged in.").await;
                }
            }
            Command::List => match self.sessions.get(chat_id) {
                Some(Stage::LoggedIn { user_id }) => self.send_task_list(chat_id, user_id).await,
                _ => {
                    self.send_text(chat_id, "Please log in first: /login").await;
                }
            },
            Command::Remind => match self.sessions.get(chat_id) {
                Some(Stage::LoggedIn { user_id }) => {
                    self.sessions
                        .set(chat_id, Stage::AwaitingReminderDetails { user_id });
                    self.send_text(
                        chat_id,
                        &format!("Which task should I remind you about, and when?\n{REMINDER_USAGE}"),
                    )
                    .await;
                }
                _ => {
                    self.send_text(chat_id, "Please log in first: /login").await;
                }
            },
        }
    }

    /// Reply with the numbered task list.
    async fn send_task_list(&self, chat_id: &str, user_id: i64) {
        match self.store.items_for_user(user_id).await {
            Ok(items) if items.is_empty() => {
                self.send_text(chat_id, "You have no tasks yet.").await;
            }
            Ok(items) => {
                let mut out = String::from("Your tasks:");
                for (i, item) in items.iter().enumerate() {
                    out.push_str(&format!("\n{}. {}", i + 1, item.text));
                }
                self.send_text(chat_id, &out).await;
            }
            Err(e) => {
                error!("failed to list tasks for chat {chat_id}: {e}");
                self.send_text(chat_id, STORE_HICCUP).await;
            }
        }
    }

    /// Interpret the `<task number> <date> <time>` reply of the reminder
    /// flow.
    ///
    /// Malformed input keeps the chat in `AwaitingReminderDetails` so the
    /// next message retries; a task number that points at nothing, and any
    /// store outcome, end the flow back at `LoggedIn`.
    async fn capture_reminder_details(&self, chat_id: &str, user_id: i64, text: &str) {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() != 3 {
            self.send_text(
                chat_id,
                &format!("That doesn't look right. {REMINDER_USAGE}"),
            )
            .await;
            return;
        }

        let Ok(index) = parts[0].parse::<i64>() else {
            self.send_text(
                chat_id,
                &format!("The task number has to be a number. {REMINDER_USAGE}"),
            )
            .await;
            return;
        };

        let Some(due_at) = datetime::parse(&format!("{} {}", parts[1], parts[2])) else {
            self.send_text(
                chat_id,
                &format!("I can't read that date and time. {REMINDER_USAGE}"),
            )
            .await;
            return;
        };

        let items = match self.store.items_for_user(user_id).await {
            Ok(items) => items,
            Err(e) => {
                error!("failed to fetch tasks for reminder in chat {chat_id}: {e}");
                self.sessions.set(chat_id, Stage::LoggedIn { user_id });
                self.send_text(chat_id, STORE_HICCUP).await;
                return;
            }
        };

        if index < 1 || index > items.len() as i64 {
            self.sessions.set(chat_id, Stage::LoggedIn { user_id });
            self.send_text(chat_id, "There is no such task. Check the numbers with /list.")
                .await;
            return;
        }
        let item = &items[(index - 1) as usize];

        match self.store.create_reminder(user_id, item.id, &due_at).await {
            Ok(_) => {
                info!(
                    "reminder set for user {user_id}, item {} at {}",
                    item.id,
                    datetime::format_storage(&due_at)
                );
                self.send_text(
                    chat_id,
                    &format!(
                        "Done! I'll remind you about \"{}\" on {} at {} (UTC).",
                        item.text, parts[1], parts[2]
                    ),
                )
                .await;
            }
            Err(e) => {
                error!("failed to store reminder for chat {chat_id}: {e}");
                self.send_text(chat_id, STORE_HICCUP).await;
            }
        }
        self.sessions.set(chat_id, Stage::LoggedIn { user_id });
    }
}

/// First 60 chars of a message for logs.
fn preview(text: &str) -> String {
    if text.chars().count() <= 60 {
        text.to_string()
    } else {
        let head: String = text.chars().take(60).collect();
        format!("{head}...")
    }
}
