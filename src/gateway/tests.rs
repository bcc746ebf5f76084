use super::Gateway;
use async_trait::async_trait;
use chime_core::config::SchedulerConfig;
use chime_core::datetime;
use chime_core::error::ChimeError;
use chime_core::message::{IncomingMessage, OutgoingMessage};
use chime_core::session::Stage;
use chime_core::traits::Channel;
use chime_store::Store;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};

/// Channel double that records outgoing messages.
struct RecordingChannel {
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    fail_send: bool,
}

impl RecordingChannel {
    fn new() -> (Self, Arc<Mutex<Vec<OutgoingMessage>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sent: Arc::clone(&sent),
                fail_send: false,
            },
            sent,
        )
    }

    fn failing() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_send: true,
        }
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, ChimeError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), ChimeError> {
        if self.fail_send {
            return Err(ChimeError::Channel("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChimeError> {
        Ok(())
    }
}

/// Channel double whose sends block until the test hands out a permit.
/// `entered` gains a permit whenever a send starts waiting.
struct GatedChannel {
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    entered: Arc<Semaphore>,
    release: Arc<Semaphore>,
}

#[async_trait]
impl Channel for GatedChannel {
    fn name(&self) -> &str {
        "gated"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, ChimeError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), ChimeError> {
        self.entered.add_permits(1);
        self.release.acquire().await.unwrap().forget();
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChimeError> {
        Ok(())
    }
}

async fn test_gateway() -> (Arc<Gateway>, Arc<Mutex<Vec<OutgoingMessage>>>) {
    let store = Store::open_in_memory().await.unwrap();
    let (channel, sent) = RecordingChannel::new();
    let gateway = Arc::new(Gateway::new(
        Arc::new(channel),
        store,
        SchedulerConfig::default(),
    ));
    (gateway, sent)
}

fn incoming(chat_id: &str, text: &str) -> IncomingMessage {
    IncomingMessage {
        id: uuid::Uuid::new_v4(),
        chat_id: chat_id.to_string(),
        sender_name: Some("tester".to_string()),
        text: text.to_string(),
        timestamp: chrono::Utc::now(),
    }
}

async fn say(gateway: &Gateway, chat_id: &str, text: &str) {
    gateway.handle_message(incoming(chat_id, text)).await;
}

fn last_text(sent: &Arc<Mutex<Vec<OutgoingMessage>>>) -> String {
    sent.lock()
        .unwrap()
        .last()
        .map(|m| m.text.clone())
        .unwrap_or_default()
}

fn sent_count(sent: &Arc<Mutex<Vec<OutgoingMessage>>>) -> usize {
    sent.lock().unwrap().len()
}

/// Walk a chat through a full login.
async fn log_in(gateway: &Gateway, chat_id: &str, username: &str, password: &str) {
    say(gateway, chat_id, "/login").await;
    say(gateway, chat_id, username).await;
    say(gateway, chat_id, password).await;
}

// --- Commands and login flow ---

#[tokio::test]
async fn test_start_greets_without_touching_state() {
    let (gw, sent) = test_gateway().await;

    say(&gw, "100", "/start").await;

    assert!(last_text(&sent).contains("/login"));
    assert_eq!(gw.sessions.get("100"), None);
}

#[tokio::test]
async fn test_login_happy_path() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();

    say(&gw, "100", "/login").await;
    assert!(last_text(&sent).contains("username"));
    assert_eq!(gw.sessions.get("100"), Some(Stage::AwaitingUsername));

    say(&gw, "100", "alice").await;
    assert!(last_text(&sent).contains("password"));
    assert_eq!(
        gw.sessions.get("100"),
        Some(Stage::AwaitingPassword {
            username: "alice".to_string()
        })
    );

    say(&gw, "100", "wonderland").await;
    assert!(last_text(&sent).contains("alice"));
    assert_eq!(gw.sessions.get("100"), Some(Stage::LoggedIn { user_id }));

    let alice = gw.store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(alice.chat_id.as_deref(), Some("100"));
}

#[tokio::test]
async fn test_login_wrong_password_destroys_session() {
    let (gw, sent) = test_gateway().await;
    gw.store.create_user("alice", "wonderland").await.unwrap();

    log_in(&gw, "100", "alice", "nope").await;

    assert!(last_text(&sent).contains("Wrong username or password"));
    assert_eq!(gw.sessions.get("100"), None);

    // The whole flow has to start over; commands see an anonymous chat.
    say(&gw, "100", "/list").await;
    assert!(last_text(&sent).contains("log in first"));
}

#[tokio::test]
async fn test_login_unknown_username_destroys_session() {
    let (gw, sent) = test_gateway().await;

    log_in(&gw, "100", "nobody", "whatever").await;

    assert!(last_text(&sent).contains("Wrong username or password"));
    assert_eq!(gw.sessions.get("100"), None);
}

#[tokio::test]
async fn test_login_restarts_from_any_stage() {
    let (gw, _sent) = test_gateway().await;

    say(&gw, "100", "/login").await;
    say(&gw, "100", "alice").await;

    // A second /login while waiting for the password starts over.
    say(&gw, "100", "/login").await;
    assert_eq!(gw.sessions.get("100"), Some(Stage::AwaitingUsername));

    say(&gw, "100", "bob").await;
    assert_eq!(
        gw.sessions.get("100"),
        Some(Stage::AwaitingPassword {
            username: "bob".to_string()
        })
    );
}

#[tokio::test]
async fn test_login_steals_chat_binding() {
    let (gw, _sent) = test_gateway().await;
    gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_user("bob", "builder").await.unwrap();

    log_in(&gw, "100", "alice", "wonderland").await;
    log_in(&gw, "100", "bob", "builder").await;

    let alice = gw.store.find_by_username("alice").await.unwrap().unwrap();
    let bob = gw.store.find_by_username("bob").await.unwrap().unwrap();
    assert_eq!(alice.chat_id, None);
    assert_eq!(bob.chat_id.as_deref(), Some("100"));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let (gw, sent) = test_gateway().await;
    gw.store.create_user("alice", "wonderland").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;

    say(&gw, "100", "/logout").await;
    assert!(last_text(&sent).contains("Signed out"));
    assert_eq!(gw.sessions.get("100"), None);
}

#[tokio::test]
async fn test_logout_when_anonymous() {
    let (gw, sent) = test_gateway().await;

    say(&gw, "100", "/logout").await;
    assert!(last_text(&sent).contains("not logged in"));
}

#[tokio::test]
async fn test_unknown_command_is_silently_ignored() {
    let (gw, sent) = test_gateway().await;

    say(&gw, "100", "/help").await;
    assert_eq!(sent_count(&sent), 0);

    // Mid-flow it is ignored too, and the stage survives.
    say(&gw, "100", "/login").await;
    say(&gw, "100", "/frobnicate").await;
    assert_eq!(gw.sessions.get("100"), Some(Stage::AwaitingUsername));
}

#[tokio::test]
async fn test_free_text_without_session_is_ignored() {
    let (gw, sent) = test_gateway().await;

    say(&gw, "100", "hello there").await;
    say(&gw, "100", "anyone home?").await;
    assert_eq!(sent_count(&sent), 0);
}

#[tokio::test]
async fn test_free_text_while_logged_in_is_ignored() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;
    let before = sent_count(&sent);

    say(&gw, "100", "what's the weather like?").await;
    assert_eq!(sent_count(&sent), before);
    assert_eq!(gw.sessions.get("100"), Some(Stage::LoggedIn { user_id }));
}

#[tokio::test]
async fn test_chats_have_independent_sessions() {
    let (gw, _sent) = test_gateway().await;
    gw.store.create_user("alice", "wonderland").await.unwrap();

    log_in(&gw, "100", "alice", "wonderland").await;
    assert!(matches!(
        gw.sessions.get("100"),
        Some(Stage::LoggedIn { .. })
    ));
    assert_eq!(gw.sessions.get("200"), None);
}

// --- /list ---

#[tokio::test]
async fn test_list_requires_login() {
    let (gw, sent) = test_gateway().await;

    say(&gw, "100", "/list").await;
    assert!(last_text(&sent).contains("log in first"));
}

#[tokio::test]
async fn test_list_rejected_mid_reminder_flow() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_item(user_id, "buy milk").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;
    say(&gw, "100", "/remind").await;

    // Only a plain logged-in chat may list; the pending flow is untouched.
    say(&gw, "100", "/list").await;
    assert!(last_text(&sent).contains("log in first"));
    assert_eq!(
        gw.sessions.get("100"),
        Some(Stage::AwaitingReminderDetails { user_id })
    );
}

#[tokio::test]
async fn test_list_empty() {
    let (gw, sent) = test_gateway().await;
    gw.store.create_user("alice", "wonderland").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;

    say(&gw, "100", "/list").await;
    assert!(last_text(&sent).contains("no tasks"));
}

#[tokio::test]
async fn test_list_numbers_tasks_in_creation_order() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_item(user_id, "buy milk").await.unwrap();
    gw.store.create_item(user_id, "call bob").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;

    say(&gw, "100", "/list").await;
    let reply = last_text(&sent);
    assert!(reply.contains("1. buy milk"));
    assert!(reply.contains("2. call bob"));
}

// --- /remind ---

#[tokio::test]
async fn test_remind_requires_login() {
    let (gw, sent) = test_gateway().await;

    say(&gw, "100", "/remind").await;
    assert!(last_text(&sent).contains("log in first"));
    assert_eq!(gw.sessions.get("100"), None);
}

#[tokio::test]
async fn test_remind_flow_stores_reminder() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_item(user_id, "buy milk").await.unwrap();
    let call_bob = gw.store.create_item(user_id, "call bob").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;

    say(&gw, "100", "/remind").await;
    assert_eq!(
        gw.sessions.get("100"),
        Some(Stage::AwaitingReminderDetails { user_id })
    );

    say(&gw, "100", "2 21.06.2025 23:30").await;
    assert!(last_text(&sent).contains("call bob"));
    assert_eq!(gw.sessions.get("100"), Some(Stage::LoggedIn { user_id }));

    let reminders = gw.store.reminders_for_user(user_id).await.unwrap();
    assert_eq!(reminders.len(), 1);
    let (_, item_id, due_at) = &reminders[0];
    assert_eq!(*item_id, call_bob);
    assert_eq!(due_at, "2025-06-21 23:30:00");
}

#[tokio::test]
async fn test_remind_malformed_input_keeps_flow_open() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_item(user_id, "buy milk").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;
    say(&gw, "100", "/remind").await;

    // Wrong token count, non-numeric index, impossible date: each keeps
    // the flow open for another try.
    for details in ["soon", "one 21.06.2025 23:30", "1 31.02.2025 10:00"] {
        say(&gw, "100", details).await;
        assert_eq!(
            gw.sessions.get("100"),
            Some(Stage::AwaitingReminderDetails { user_id }),
            "stage lost after {details:?}"
        );
    }
    assert!(gw.store.reminders_for_user(user_id).await.unwrap().is_empty());

    // A corrected reply still lands.
    say(&gw, "100", "1 21.06.2025 23:30").await;
    assert!(last_text(&sent).contains("buy milk"));
    assert_eq!(gw.store.reminders_for_user(user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remind_out_of_range_index_ends_flow() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_item(user_id, "buy milk").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;

    for index in ["5", "0", "-3"] {
        say(&gw, "100", "/remind").await;
        say(&gw, "100", &format!("{index} 21.06.2025 23:30")).await;
        assert!(
            last_text(&sent).to_lowercase().contains("no such task"),
            "expected rejection for index {index}"
        );
        assert_eq!(
            gw.sessions.get("100"),
            Some(Stage::LoggedIn { user_id }),
            "flow should end for index {index}"
        );
    }
    assert!(gw.store.reminders_for_user(user_id).await.unwrap().is_empty());
}

// --- Per-chat message ordering ---

#[tokio::test]
async fn test_dispatch_buffers_messages_while_chat_is_busy() {
    let store = Store::open_in_memory().await.unwrap();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let entered = Arc::new(Semaphore::new(0));
    let release = Arc::new(Semaphore::new(0));
    let channel = GatedChannel {
        sent: Arc::clone(&sent),
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    };
    let gw = Arc::new(Gateway::new(
        Arc::new(channel),
        store,
        SchedulerConfig::default(),
    ));

    // The first message stalls inside the channel while sending its reply.
    let first = tokio::spawn({
        let gw = gw.clone();
        async move { gw.dispatch_message(incoming("100", "/login")).await }
    });
    entered.acquire().await.unwrap().forget();
    assert_eq!(gw.sessions.get("100"), Some(Stage::AwaitingUsername));

    // A second message for the same chat is queued, not handled.
    gw.clone().dispatch_message(incoming("100", "alice")).await;
    assert_eq!(gw.sessions.get("100"), Some(Stage::AwaitingUsername));
    assert_eq!(sent_count(&sent), 0);

    // Unblock the channel; the queued message is drained after the first.
    release.add_permits(2);
    first.await.unwrap();

    assert_eq!(
        gw.sessions.get("100"),
        Some(Stage::AwaitingPassword {
            username: "alice".to_string()
        })
    );
    let texts: Vec<String> = sent.lock().unwrap().iter().map(|m| m.text.clone()).collect();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].contains("username"));
    assert!(texts[1].contains("password"));
    assert!(gw.active_chats.lock().await.is_empty());
}

// --- Reminder dispatch ---

async fn seed_bound_user(store: &Store, chat_id: &str) -> (i64, i64) {
    let user_id = store.create_user("alice", "wonderland").await.unwrap();
    let item_id = store.create_item(user_id, "call bob").await.unwrap();
    store.bind_chat(user_id, chat_id).await.unwrap();
    (user_id, item_id)
}

#[tokio::test]
async fn test_dispatch_delivers_due_reminder_and_deletes_it() {
    let store = Store::open_in_memory().await.unwrap();
    let (channel, sent) = RecordingChannel::new();
    let (user_id, item_id) = seed_bound_user(&store, "100").await;
    let past = datetime::parse("21.06.2025 23:30").unwrap();
    store.create_reminder(user_id, item_id, &past).await.unwrap();

    Gateway::dispatch_due_reminders(&store, &channel).await.unwrap();

    let messages = sent.lock().unwrap().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].chat_id, "100");
    assert_eq!(messages[0].text, "🔔 Reminder: \"call bob\"");
    assert!(store.reminders_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_leaves_future_reminders_alone() {
    let store = Store::open_in_memory().await.unwrap();
    let (channel, sent) = RecordingChannel::new();
    let (user_id, item_id) = seed_bound_user(&store, "100").await;
    let future = datetime::parse("21.06.2099 23:30").unwrap();
    store
        .create_reminder(user_id, item_id, &future)
        .await
        .unwrap();

    Gateway::dispatch_due_reminders(&store, &channel).await.unwrap();

    assert_eq!(sent_count(&sent), 0);
    assert_eq!(store.reminders_for_user(user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dispatch_discards_reminder_without_bound_chat() {
    let store = Store::open_in_memory().await.unwrap();
    let (channel, sent) = RecordingChannel::new();
    let user_id = store.create_user("alice", "wonderland").await.unwrap();
    let item_id = store.create_item(user_id, "call bob").await.unwrap();
    let past = datetime::parse("21.06.2025 23:30").unwrap();
    store.create_reminder(user_id, item_id, &past).await.unwrap();

    Gateway::dispatch_due_reminders(&store, &channel).await.unwrap();

    assert_eq!(sent_count(&sent), 0);
    assert!(store.reminders_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_discards_orphaned_reminder() {
    let store = Store::open_in_memory().await.unwrap();
    let (channel, sent) = RecordingChannel::new();
    let (user_id, _) = seed_bound_user(&store, "100").await;
    let past = datetime::parse("21.06.2025 23:30").unwrap();
    // Points at an item that was never created.
    store.create_reminder(user_id, 9999, &past).await.unwrap();

    Gateway::dispatch_due_reminders(&store, &channel).await.unwrap();

    assert_eq!(sent_count(&sent), 0);
    assert!(store.reminders_for_user(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_keeps_reminder_when_send_fails() {
    let store = Store::open_in_memory().await.unwrap();
    let channel = RecordingChannel::failing();
    let (user_id, item_id) = seed_bound_user(&store, "100").await;
    let past = datetime::parse("21.06.2025 23:30").unwrap();
    store.create_reminder(user_id, item_id, &past).await.unwrap();

    Gateway::dispatch_due_reminders(&store, &channel).await.unwrap();

    // Undelivered, so the next cycle will pick it up again.
    assert_eq!(store.reminders_for_user(user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reminder_set_in_dialog_is_dispatched() {
    let (gw, sent) = test_gateway().await;
    let user_id = gw.store.create_user("alice", "wonderland").await.unwrap();
    gw.store.create_item(user_id, "buy milk").await.unwrap();
    gw.store.create_item(user_id, "call bob").await.unwrap();
    log_in(&gw, "100", "alice", "wonderland").await;
    say(&gw, "100", "/remind").await;
    say(&gw, "100", "2 21.06.2025 23:30").await;

    let (recorder, dispatched) = RecordingChannel::new();
    Gateway::dispatch_due_reminders(&gw.store, &recorder)
        .await
        .unwrap();

    assert_eq!(last_text(&dispatched), "🔔 Reminder: \"call bob\"");
    assert!(gw.store.reminders_for_user(user_id).await.unwrap().is_empty());
    // The dialog channel saw only the conversation, not the reminder.
    assert!(sent.lock().unwrap().iter().all(|m| !m.text.contains('🔔')));
}
