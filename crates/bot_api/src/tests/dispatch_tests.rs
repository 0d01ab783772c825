use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChatId, Event, EventId, FileId, StoredFile, Task, TaskId, User, UserId},
    error::{INTERNAL_MESSAGE, UNREGISTERED_MESSAGE},
    protocol::{AttachmentKind, Sender},
};
use storage::{NewEvent, NewFile, NewTask, StoreStats, Storage};

use super::*;

#[derive(Default)]
struct RecordingMessenger {
    sent: StdMutex<Vec<(ChatId, Reply)>>,
    acks: StdMutex<Vec<String>>,
    failing: HashSet<ChatId>,
    hanging: HashSet<ChatId>,
}

impl RecordingMessenger {
    fn sent(&self) -> Vec<(ChatId, Reply)> {
        self.sent.lock().expect("sent lock").clone()
    }

    fn last_text(&self) -> String {
        self.sent()
            .last()
            .map(|(_, reply)| reply.text.clone())
            .expect("at least one reply")
    }

    fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, reply)| reply.text)
            .collect()
    }

    fn acks(&self) -> Vec<String> {
        self.acks.lock().expect("ack lock").clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        if self.hanging.contains(&chat_id) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.contains(&chat_id) {
            return Err(anyhow!("chat {chat_id} blocked the bot"));
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((chat_id, reply.clone()));
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<()> {
        self.acks
            .lock()
            .expect("ack lock")
            .push(callback_id.to_string());
        Ok(())
    }
}

/// Counts child-record reads so tests can assert a handler never reached them.
struct CountingStore {
    inner: Storage,
    list_calls: AtomicUsize,
}

impl CountingStore {
    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    async fn find_user_by_account(&self, account_id: AccountId) -> Result<Option<User>> {
        self.inner.find_user_by_account(account_id).await
    }

    async fn get_or_create_user(
        &self,
        account_id: AccountId,
        display_name: &str,
    ) -> Result<(User, bool)> {
        self.inner.get_or_create_user(account_id, display_name).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users().await
    }

    async fn insert_task(&self, owner: UserId, task: &NewTask) -> Result<TaskId> {
        self.inner.insert_task(owner, task).await
    }

    async fn list_tasks_for_user(&self, owner: UserId) -> Result<Vec<Task>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_tasks_for_user(owner).await
    }

    async fn delete_task(&self, owner: UserId, task_id: TaskId) -> Result<bool> {
        self.inner.delete_task(owner, task_id).await
    }

    async fn insert_event(&self, owner: UserId, event: &NewEvent) -> Result<EventId> {
        self.inner.insert_event(owner, event).await
    }

    async fn list_events_for_user(&self, owner: UserId) -> Result<Vec<Event>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_events_for_user(owner).await
    }

    async fn delete_event(&self, owner: UserId, event_id: EventId) -> Result<bool> {
        self.inner.delete_event(owner, event_id).await
    }

    async fn insert_file(&self, owner: UserId, file: &NewFile) -> Result<FileId> {
        self.inner.insert_file(owner, file).await
    }

    async fn list_files_for_user(&self, owner: UserId) -> Result<Vec<StoredFile>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_files_for_user(owner).await
    }

    async fn delete_file(&self, owner: UserId, file_id: FileId) -> Result<bool> {
        self.inner.delete_file(owner, file_id).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}

struct Harness {
    dispatcher: Dispatcher,
    store: Arc<CountingStore>,
    messenger: Arc<RecordingMessenger>,
}

async fn harness_with(messenger: RecordingMessenger, broadcast: BroadcastSettings) -> Harness {
    let inner = Storage::new("sqlite::memory:")
        .await
        .expect("in-memory storage");
    let store = Arc::new(CountingStore {
        inner,
        list_calls: AtomicUsize::new(0),
    });
    let messenger = Arc::new(messenger);
    let ctx = BotContext::new(store.clone(), messenger.clone()).with_broadcast(broadcast);
    Harness {
        dispatcher: Dispatcher::new(ctx),
        store,
        messenger,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingMessenger::default(), BroadcastSettings::default()).await
}

fn sender(account: i64, first_name: &str) -> Sender {
    Sender {
        account_id: AccountId(account),
        first_name: Some(first_name.to_string()),
        username: None,
    }
}

fn text(account: i64, body: &str) -> InboundEvent {
    InboundEvent {
        sender: sender(account, "Ann"),
        chat_id: ChatId(account),
        kind: InboundKind::Message {
            text: Some(body.to_string()),
            attachment: None,
        },
    }
}

fn press(account: i64, token: &str) -> InboundEvent {
    InboundEvent {
        sender: sender(account, "Ann"),
        chat_id: ChatId(account),
        kind: InboundKind::ButtonPress {
            callback_id: format!("cb-{account}-{token}"),
            data: Some(token.to_string()),
        },
    }
}

async fn register(h: &Harness, account: i64) {
    h.dispatcher.handle(text(account, "/start")).await;
}

#[tokio::test]
async fn start_registers_once_and_greets_returning_users() {
    let h = harness().await;

    h.dispatcher.handle(text(42, "/start")).await;
    let first = h.messenger.sent();
    let (chat, reply) = first.last().expect("greeting");
    assert_eq!(*chat, ChatId(42));
    assert!(reply.text.starts_with("Welcome, Ann!"));
    assert!(reply.text.ends_with(format::MENU_PROMPT));
    assert_eq!(reply.keyboard, Some(format::main_menu()));

    h.dispatcher.handle(text(42, "/start")).await;
    assert!(h.messenger.last_text().starts_with("Welcome back, Ann!"));

    let users = h.store.list_users().await.expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].account_id, AccountId(42));
}

#[tokio::test]
async fn add_task_stores_record_and_lists_it() {
    let h = harness().await;
    register(&h, 1).await;

    h.dispatcher
        .handle(text(1, "/add_task Report, Q1 numbers, 2024.03.01"))
        .await;
    assert_eq!(h.messenger.last_text(), "Task added successfully!");

    h.dispatcher.handle(text(1, "/list_tasks")).await;
    let listing = h.messenger.last_text();
    assert!(listing.starts_with("Your tasks:"));
    assert!(listing.contains(": Report - Q1 numbers - due 2024.03.01"));
}

#[tokio::test]
async fn add_task_with_bad_date_creates_nothing() {
    let h = harness().await;
    register(&h, 1).await;

    h.dispatcher
        .handle(text(1, "/add_task Title, Desc, 03/01/2024"))
        .await;
    assert_eq!(
        h.messenger.last_text(),
        "Invalid date format. Use YYYY.MM.DD."
    );

    let stats = h.store.stats().await.expect("stats");
    assert_eq!(stats.tasks, 0);
}

#[tokio::test]
async fn delete_task_validates_id_and_removes_only_the_match() {
    let h = harness().await;
    register(&h, 1).await;
    h.dispatcher.handle(text(1, "/add_task A, first, 2024.01.01")).await;
    h.dispatcher.handle(text(1, "/add_task B, second, 2024.01.02")).await;

    let user = h
        .store
        .find_user_by_account(AccountId(1))
        .await
        .expect("lookup")
        .expect("registered");
    let tasks = h.store.list_tasks_for_user(user.user_id).await.expect("tasks");
    let target = tasks[0].task_id;
    let survivor = tasks[1].task_id;

    h.dispatcher.handle(text(1, "/delete_task abc")).await;
    assert_eq!(
        h.messenger.last_text(),
        "Invalid task ID. The ID must be a number."
    );

    h.dispatcher.handle(text(1, "/delete_task 9999")).await;
    assert_eq!(h.messenger.last_text(), "Task with ID 9999 not found.");

    h.dispatcher
        .handle(text(1, &format!("/delete_task {target}")))
        .await;
    assert_eq!(h.messenger.last_text(), "Task deleted successfully!");

    let remaining = h.store.list_tasks_for_user(user.user_id).await.expect("tasks");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].task_id, survivor);
}

#[tokio::test]
async fn other_users_records_are_reported_as_not_found() {
    let h = harness().await;
    register(&h, 1).await;
    register(&h, 2).await;
    h.dispatcher.handle(text(1, "/add_event Standup 2024-04-20")).await;

    let owner = h
        .store
        .find_user_by_account(AccountId(1))
        .await
        .expect("lookup")
        .expect("registered");
    let events = h.store.list_events_for_user(owner.user_id).await.expect("events");
    let event_id = events[0].event_id;

    h.dispatcher
        .handle(text(2, &format!("/delete_event {event_id}")))
        .await;
    assert_eq!(
        h.messenger.last_text(),
        format!("Event with ID {event_id} not found.")
    );
    let events = h.store.list_events_for_user(owner.user_id).await.expect("events");
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn add_event_confirms_and_empty_listing_has_its_own_message() {
    let h = harness().await;
    register(&h, 5).await;

    h.dispatcher.handle(text(5, "/list_events")).await;
    assert_eq!(h.messenger.last_text(), format::NO_EVENTS);

    h.dispatcher
        .handle(text(5, "/add_event Team meeting 2024-04-20"))
        .await;
    assert_eq!(
        h.messenger.last_text(),
        "Event added:\nTitle: Team meeting\nDate: 2024-04-20"
    );

    h.dispatcher.handle(press(5, "list_events")).await;
    assert!(h.messenger.last_text().contains(": Team meeting - 20.04.2024"));
}

#[tokio::test]
async fn unregistered_users_are_told_to_start_and_no_records_are_read() {
    let h = harness().await;

    h.dispatcher.handle(text(7, "/list_tasks")).await;
    assert_eq!(h.messenger.last_text(), UNREGISTERED_MESSAGE);
    h.dispatcher.handle(press(7, "list_files")).await;
    assert_eq!(h.messenger.last_text(), UNREGISTERED_MESSAGE);
    h.dispatcher.handle(text(7, "/add_task A, b, 2024.01.01")).await;
    assert_eq!(h.messenger.last_text(), UNREGISTERED_MESSAGE);

    assert_eq!(h.store.list_calls(), 0);
    let stats = h.store.stats().await.expect("stats");
    assert_eq!(stats, StoreStats::default());
}

#[tokio::test]
async fn listing_unchanged_data_renders_identically() {
    let h = harness().await;
    register(&h, 3).await;
    h.dispatcher.handle(text(3, "/add_task A, one, 2024.02.01")).await;
    h.dispatcher.handle(text(3, "/add_task B, two, 2024.01.01")).await;

    h.dispatcher.handle(text(3, "/list_tasks")).await;
    let first = h.messenger.last_text();
    h.dispatcher.handle(press(3, "list_tasks")).await;
    let second = h.messenger.last_text();

    assert_eq!(first, second);
    let b = first.find(": B - two").expect("B listed");
    let a = first.find(": A - one").expect("A listed");
    assert!(b < a, "earlier deadline first");
}

#[tokio::test]
async fn bare_document_is_stored_with_its_name() {
    let h = harness().await;
    register(&h, 8).await;

    h.dispatcher
        .handle(InboundEvent {
            sender: sender(8, "Ann"),
            chat_id: ChatId(8),
            kind: InboundKind::Message {
                text: None,
                attachment: Some(Attachment {
                    kind: AttachmentKind::Document,
                    file_ref: "BQACAgIAAxkB".into(),
                    file_name: "plan.pdf".into(),
                }),
            },
        })
        .await;
    assert_eq!(
        h.messenger.last_text(),
        "File 'plan.pdf' uploaded successfully."
    );

    h.dispatcher
        .handle(InboundEvent {
            sender: sender(8, "Ann"),
            chat_id: ChatId(8),
            kind: InboundKind::Message {
                text: Some("/upload_file".into()),
                attachment: Some(Attachment {
                    kind: AttachmentKind::Photo,
                    file_ref: "AgACAgIAAxkB".into(),
                    file_name: String::new(),
                }),
            },
        })
        .await;
    assert_eq!(h.messenger.last_text(), "File 'photo' uploaded successfully.");

    h.dispatcher.handle(text(8, "/list_files")).await;
    let listing = h.messenger.last_text();
    assert!(listing.contains(": plan.pdf (file_id: BQACAgIAAxkB)"));
    assert!(listing.contains(": photo (file_id: AgACAgIAAxkB)"));
}

#[tokio::test]
async fn upload_command_without_document_is_rejected() {
    let h = harness().await;
    register(&h, 8).await;

    h.dispatcher.handle(text(8, "/upload_file")).await;
    assert_eq!(h.messenger.last_text(), format::UPLOAD_MISSING_DOCUMENT);
}

#[tokio::test]
async fn broadcast_survives_a_failing_recipient() {
    let messenger = RecordingMessenger {
        failing: HashSet::from([ChatId(2)]),
        ..RecordingMessenger::default()
    };
    let h = harness_with(messenger, BroadcastSettings::default()).await;
    for account in [1, 2, 3] {
        register(&h, account).await;
    }

    h.dispatcher.handle(press(1, "send_message_to_all_prompt")).await;
    assert_eq!(h.messenger.last_text(), format::BROADCAST_PROMPT);
    assert_eq!(
        h.dispatcher.context().sessions.get(AccountId(1)).await,
        SessionState::AwaitingMessage
    );

    h.dispatcher.handle(text(1, "Office closed Friday")).await;

    assert_eq!(
        h.messenger.texts_to(ChatId(3)).last().map(String::as_str),
        Some("Office closed Friday")
    );
    let to_sender = h.messenger.texts_to(ChatId(1));
    assert!(to_sender.iter().any(|t| t == "Office closed Friday"));
    assert_eq!(
        to_sender.last().map(String::as_str),
        Some("Message delivered to 2 of 3 users.")
    );
    assert_eq!(
        h.dispatcher.context().sessions.get(AccountId(1)).await,
        SessionState::Idle
    );
}

#[tokio::test]
async fn hanging_recipient_times_out_without_blocking_others() {
    let messenger = RecordingMessenger {
        hanging: HashSet::from([ChatId(2)]),
        ..RecordingMessenger::default()
    };
    let settings = BroadcastSettings {
        delivery_timeout: Duration::from_millis(100),
        ..BroadcastSettings::default()
    };
    let h = harness_with(messenger, settings).await;
    // Registered directly so no greeting goes to the hanging chat.
    for account in [1, 2, 3] {
        h.store
            .get_or_create_user(AccountId(account), "Ann")
            .await
            .expect("register");
    }

    let started = std::time::Instant::now();
    h.dispatcher
        .handle(text(1, "/send_message_to_all Fire drill at noon"))
        .await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(
        h.messenger.texts_to(ChatId(3)).last().map(String::as_str),
        Some("Fire drill at noon")
    );
    assert_eq!(
        h.messenger.last_text(),
        "Message delivered to 2 of 3 users."
    );
}

#[tokio::test]
async fn cancel_clears_the_prompt_and_later_text_is_not_broadcast() {
    let h = harness().await;
    register(&h, 1).await;
    register(&h, 2).await;

    h.dispatcher.handle(press(1, "send_message_to_all_prompt")).await;
    h.dispatcher.handle(text(1, "/cancel")).await;
    assert_eq!(h.messenger.last_text(), format::CANCELLED);

    h.dispatcher.handle(text(1, "hello everyone")).await;
    assert_eq!(h.messenger.last_text(), format::UNKNOWN_COMMAND);
    assert!(h
        .messenger
        .texts_to(ChatId(2))
        .iter()
        .all(|t| t != "hello everyone"));

    h.dispatcher.handle(text(1, "/cancel")).await;
    assert_eq!(h.messenger.last_text(), format::CANCELLED);
}

#[tokio::test]
async fn commands_while_awaiting_keep_the_prompt_open() {
    let h = harness().await;
    register(&h, 1).await;

    h.dispatcher.handle(press(1, "send_message_to_all_prompt")).await;
    h.dispatcher.handle(text(1, "/list_tasks")).await;
    assert_eq!(h.messenger.last_text(), format::NO_TASKS);
    assert_eq!(
        h.dispatcher.context().sessions.get(AccountId(1)).await,
        SessionState::AwaitingMessage
    );
}

#[tokio::test]
async fn inline_broadcast_requires_text() {
    let h = harness().await;
    register(&h, 1).await;

    h.dispatcher.handle(text(1, "/send_message_to_all   ")).await;
    assert_eq!(h.messenger.last_text(), format::BROADCAST_MISSING_TEXT);
}

#[tokio::test]
async fn allowlist_blocks_other_senders() {
    let settings = BroadcastSettings {
        allowlist: vec![AccountId(1)],
        ..BroadcastSettings::default()
    };
    let h = harness_with(RecordingMessenger::default(), settings).await;
    register(&h, 1).await;
    register(&h, 2).await;

    h.dispatcher.handle(press(2, "send_message_to_all_prompt")).await;
    assert_eq!(h.messenger.last_text(), format::BROADCAST_FORBIDDEN);
    assert_eq!(
        h.dispatcher.context().sessions.get(AccountId(2)).await,
        SessionState::Idle
    );

    h.dispatcher.handle(text(1, "/send_message_to_all hi")).await;
    assert_eq!(
        h.messenger.last_text(),
        "Message delivered to 2 of 2 users."
    );
}

#[tokio::test]
async fn unknown_button_is_acknowledged_and_answered() {
    let h = harness().await;

    h.dispatcher.handle(press(4, "launch_rockets")).await;
    assert_eq!(h.messenger.acks(), vec!["cb-4-launch_rockets".to_string()]);
    assert_eq!(h.messenger.last_text(), format::UNKNOWN_REQUEST);
}

#[tokio::test]
async fn unknown_command_and_bot_suffix() {
    let h = harness().await;

    h.dispatcher.handle(text(4, "/frobnicate")).await;
    assert_eq!(h.messenger.last_text(), format::UNKNOWN_COMMAND);

    h.dispatcher.handle(text(4, "/help@task_bot")).await;
    assert!(h.messenger.last_text().starts_with("Available commands:"));

    h.dispatcher.handle(press(4, "add_task")).await;
    assert_eq!(h.messenger.last_text(), format::ADD_TASK_HINT);
}

#[tokio::test]
async fn store_failure_gets_a_generic_reply_and_the_dispatcher_keeps_going() {
    let h = harness().await;
    register(&h, 1).await;
    h.store.inner.close().await;

    h.dispatcher.handle(text(1, "/list_tasks")).await;
    assert_eq!(h.messenger.last_text(), INTERNAL_MESSAGE);

    h.dispatcher.handle(text(1, "/add_task Title, Desc, 2024.03.01")).await;
    assert_eq!(h.messenger.last_text(), INTERNAL_MESSAGE);

    h.dispatcher.handle(text(1, "/help")).await;
    assert_ne!(h.messenger.last_text(), INTERNAL_MESSAGE);
}
