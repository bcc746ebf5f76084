//! Credential checks and chat binding.

use super::Gateway;
use chime_core::session::Stage;
use tracing::{error, info, warn};

impl Gateway {
    /// Finish the login flow with the captured username and the password
    /// just received.
    ///
    /// On success the chat is bound to the account, stealing it from any
    /// other account that held it, and the stage moves to `LoggedIn`. On a
    /// credential mismatch the session is destroyed. If the store fails the
    /// stage stays at `AwaitingPassword` so resending the password retries.
    pub(super) async fn finish_login(&self, chat_id: &str, username: &str, password: &str) {
        let user = match self.store.find_by_username(username.trim()).await {
            Ok(user) => user,
            Err(e) => {
                error!("credential check failed for chat {chat_id}: {e}");
                self.send_text(
                    chat_id,
                    "Something went wrong checking your details. Send your password again.",
                )
                .await;
                return;
            }
        };

        let Some(user) = user.filter(|u| u.password == password) else {
            self.sessions.clear(chat_id);
            warn!("failed login attempt for '{username}' from chat {chat_id}");
            self.send_text(chat_id, "Wrong username or password. Start over with /login.")
                .await;
            return;
        };

        if let Err(e) = self.store.bind_chat(user.id, chat_id).await {
            error!("failed to bind chat {chat_id} to user {}: {e}", user.id);
            self.send_text(
                chat_id,
                "Something went wrong checking your details. Send your password again.",
            )
            .await;
            return;
        }

        self.sessions
            .set(chat_id, Stage::LoggedIn { user_id: user.id });
        info!("user {} ('{}') logged in from chat {chat_id}", user.id, user.username);
        self.send_text(
            chat_id,
            &format!(
                "✅ You're in, {}! Use /list to see your tasks or /remind to set a reminder.",
                user.username
            ),
        )
        .await;
    }
}
