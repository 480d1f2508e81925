//! End-to-end realtime session tests
//!
//! These tests run a full manager against the in-memory transport with a
//! paused clock, so backoff schedules complete instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::assert_ok;

use chat_realtime::config::{PresentationConfig, RealtimeConfig, Settings};
use chat_realtime::presenter::{ClickAction, Presenters, RecordingPresenter};
use chat_realtime::realtime::{
    BroadcastEnvelope, ChangeType, ChatHandlers, ChatTable, ConnectionState, ConversationChange,
    EnvironmentSignal, MessageChange, RealtimeHandle, RealtimeManager, RowChange,
    SubscriptionStatus, UserId,
};
use chat_realtime::transport::{MemoryTransport, Transport};

/// Everything a handler saw, in order
#[derive(Default)]
struct Seen {
    conversations: Mutex<Vec<ConversationChange>>,
    messages: Mutex<Vec<MessageChange>>,
}

impl Seen {
    fn handlers(self: &Arc<Self>) -> ChatHandlers {
        let conversations = self.clone();
        let messages = self.clone();
        ChatHandlers::new()
            .on_conversation_change(move |c| conversations.conversations.lock().unwrap().push(c))
            .on_message_change(move |m| messages.messages.lock().unwrap().push(m))
    }

    fn conversations(&self) -> Vec<ConversationChange> {
        self.conversations.lock().unwrap().clone()
    }

    fn messages(&self) -> Vec<MessageChange> {
        self.messages.lock().unwrap().clone()
    }
}

struct TestEnvironment {
    transport: Arc<MemoryTransport>,
    presenter: Arc<RecordingPresenter>,
    manager: RealtimeManager,
}

fn create_test_environment(transport: MemoryTransport, realtime: RealtimeConfig) -> TestEnvironment {
    let transport = Arc::new(transport);
    let presenter = Arc::new(RecordingPresenter::new());
    let manager = RealtimeManager::new(
        transport.clone(),
        Presenters::shared(presenter.clone()),
        realtime,
        PresentationConfig::default(),
    );

    TestEnvironment {
        transport,
        presenter,
        manager,
    }
}

async fn settle(handle: &RealtimeHandle) -> chat_realtime::realtime::ConnectionSnapshot {
    handle.snapshot().await.expect("session should be running")
}

fn row(event_type: ChangeType, table: ChatTable, new: Value, old: Value) -> RowChange {
    RowChange::new(event_type, table, new, old)
}

#[tokio::test(start_paused = true)]
async fn test_full_chat_flow() {
    let mut env = create_test_environment(MemoryTransport::with_auto_ack(), RealtimeConfig::default());
    let seen = Arc::new(Seen::default());
    let handle = env.manager.start(seen.handlers(), Some(UserId::from("u1")));

    assert!(settle(&handle).await.connected);

    // Someone creates a conversation and adds us
    env.transport.publish_change(row(
        ChangeType::Insert,
        ChatTable::Conversation,
        json!({"id": "c1"}),
        Value::Null,
    ));
    env.transport.publish_change(row(
        ChangeType::Insert,
        ChatTable::ConversationMember,
        json!({"conversationId": "c1", "userId": "u1"}),
        Value::Null,
    ));
    // A member other than us joins: no toast, still an update
    env.transport.publish_change(row(
        ChangeType::Insert,
        ChatTable::ConversationMember,
        json!({"conversationId": "c1", "userId": "u3"}),
        Value::Null,
    ));
    // They write, we write, then the conversation is deleted
    env.transport.publish_change(row(
        ChangeType::Insert,
        ChatTable::Message,
        json!({"id": "m1", "conversationId": "c1", "senderId": "u2", "content": "hey"}),
        Value::Null,
    ));
    env.transport.publish_change(row(
        ChangeType::Insert,
        ChatTable::Message,
        json!({"id": "m2", "conversationId": "c1", "senderId": "u1", "content": "hi"}),
        Value::Null,
    ));
    env.transport.publish_change(row(
        ChangeType::Delete,
        ChatTable::Conversation,
        Value::Null,
        json!({"id": "c1"}),
    ));

    let snapshot = settle(&handle).await;
    assert_eq!(snapshot.events_dispatched, 6);

    assert_eq!(
        seen.conversations(),
        vec![
            ConversationChange {
                event_type: Some(ChangeType::Insert),
                conversation_id: Some("c1".to_string()),
            },
            ConversationChange {
                event_type: Some(ChangeType::Update),
                conversation_id: Some("c1".to_string()),
            },
            ConversationChange {
                event_type: Some(ChangeType::Update),
                conversation_id: Some("c1".to_string()),
            },
            ConversationChange {
                event_type: Some(ChangeType::Delete),
                conversation_id: Some("c1".to_string()),
            },
        ]
    );

    let messages = seen.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message_id.as_deref(), Some("m1"));
    assert_eq!(messages[1].message_id.as_deref(), Some("m2"));

    let titles: Vec<String> = env.presenter.toasts().into_iter().map(|t| t.title).collect();
    assert_eq!(
        titles,
        vec![
            "New conversation created",
            "You were added to a conversation",
            "New message",
            "Conversation deleted",
        ]
    );

    let notifications = env.presenter.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].tag, "c1");
    assert_eq!(
        notifications[0].on_click,
        ClickAction::Navigate("/chat?conversationId=c1".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_flow() {
    let mut env = create_test_environment(MemoryTransport::with_auto_ack(), RealtimeConfig::default());
    let seen = Arc::new(Seen::default());
    let handle = env.manager.start(seen.handlers(), Some(UserId::from("u1")));
    settle(&handle).await;

    env.transport.publish_broadcast(BroadcastEnvelope::new(
        "message:new",
        json!({"messageId": "m1", "conversationId": "c1", "senderId": "u1"}),
    ));
    env.transport.publish_broadcast(BroadcastEnvelope::new(
        "message:new",
        json!({"messageId": "m2", "conversationId": "c1", "senderId": "u2"}),
    ));
    // Missing fields come through as None
    env.transport.publish_broadcast(BroadcastEnvelope::new("message:new", json!({})));

    let snapshot = settle(&handle).await;
    assert_eq!(snapshot.events_suppressed, 1);
    assert_eq!(snapshot.events_dispatched, 2);

    assert_eq!(
        seen.messages(),
        vec![
            MessageChange {
                event_type: Some(ChangeType::Insert),
                message_id: Some("m2".to_string()),
                conversation_id: Some("c1".to_string()),
            },
            MessageChange {
                event_type: Some(ChangeType::Insert),
                message_id: None,
                conversation_id: None,
            },
        ]
    );

    // Broadcasts never toast
    assert!(env.presenter.toasts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_outage_degrades_then_recovers_on_visibility() {
    let mut env = create_test_environment(MemoryTransport::new(), RealtimeConfig::default());
    let handle = env.manager.start(ChatHandlers::new(), Some(UserId::from("u1")));
    settle(&handle).await;

    env.transport.emit_status(SubscriptionStatus::Subscribed);
    assert!(settle(&handle).await.connected);

    // Transport goes down: the current channel errors, every resubscription fails
    env.transport.fail_next_subscribes(usize::MAX);
    env.transport.emit_status(SubscriptionStatus::ChannelError);
    assert!(!settle(&handle).await.connected);

    tokio::time::sleep(Duration::from_secs(3_600)).await;

    let snapshot = settle(&handle).await;
    assert_eq!(snapshot.state, ConnectionState::Degraded);
    assert_eq!(snapshot.retry_count, 15);
    assert!(snapshot.pending_retry_ms.is_none());
    assert!(snapshot.channel_id.is_none());
    assert!(!handle.is_connected());
    // Initial subscription plus 15 failed resubscriptions
    assert_eq!(env.transport.subscribe_count(), 16);
    // Connectivity problems are never toasted
    assert!(env.presenter.toasts().is_empty());

    env.transport.fail_next_subscribes(0);
    handle.signal(EnvironmentSignal::Visible);
    settle(&handle).await;
    env.transport.emit_status(SubscriptionStatus::Subscribed);

    let snapshot = settle(&handle).await;
    assert!(snapshot.connected);
    assert_eq!(snapshot.state, ConnectionState::Subscribed);
    assert_eq!(snapshot.retry_count, 0);
    assert_eq!(snapshot.stats.reconnections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_grow_and_cap() {
    let realtime = RealtimeConfig {
        backoff_jitter_ms: 0,
        ..RealtimeConfig::default()
    };
    let mut env = create_test_environment(MemoryTransport::new(), realtime);
    let handle = env.manager.start(ChatHandlers::new(), Some(UserId::from("u1")));
    settle(&handle).await;

    let mut delays = Vec::new();
    for _ in 0..8 {
        assert!(env.transport.emit_status(SubscriptionStatus::TimedOut));
        let snapshot = settle(&handle).await;
        let delay = snapshot.pending_retry_ms.expect("retry scheduled");
        delays.push(delay);
        // Just past the deadline so the retry has fired
        tokio::time::sleep(Duration::from_millis(delay + 1)).await;
        settle(&handle).await;
    }

    assert_eq!(
        delays,
        vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000, 60_000]
    );
}

#[tokio::test(start_paused = true)]
async fn test_liveness_reset_can_be_disabled() {
    let realtime = RealtimeConfig {
        liveness_resets_retries: false,
        ..RealtimeConfig::default()
    };
    let mut env = create_test_environment(MemoryTransport::new(), realtime);
    let handle = env.manager.start(ChatHandlers::new(), Some(UserId::from("u1")));
    settle(&handle).await;

    env.transport.emit_status(SubscriptionStatus::ChannelError);
    tokio::time::sleep(Duration::from_millis(2_000)).await;

    env.transport.publish_change(row(
        ChangeType::Update,
        ChatTable::Conversation,
        json!({"id": "c1"}),
        Value::Null,
    ));

    let snapshot = settle(&handle).await;
    assert_eq!(snapshot.events_dispatched, 1);
    assert_eq!(snapshot.retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_failure_does_not_block_reconnect() {
    let mut env = create_test_environment(MemoryTransport::with_auto_ack(), RealtimeConfig::default());
    env.transport.fail_removals(true);
    let handle = env.manager.start(ChatHandlers::new(), Some(UserId::from("u1")));
    settle(&handle).await;

    handle.reconnect();
    handle.reconnect();

    let snapshot = settle(&handle).await;
    assert!(snapshot.connected);
    assert_eq!(env.transport.subscribe_count(), 3);
    assert_eq!(env.transport.remove_count(), 2);
    assert_eq!(env.transport.live_channels(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connected_flag_is_observable() {
    let mut env = create_test_environment(MemoryTransport::new(), RealtimeConfig::default());
    let handle = env.manager.start(ChatHandlers::new(), Some(UserId::from("u1")));
    let mut connected = handle.watch_connected();
    settle(&handle).await;
    assert!(!*connected.borrow());

    env.transport.emit_status(SubscriptionStatus::Subscribed);
    assert_ok!(connected.changed().await);
    assert!(*connected.borrow_and_update());

    env.transport.emit_status(SubscriptionStatus::Closed);
    assert_ok!(connected.changed().await);
    assert!(!*connected.borrow_and_update());

    env.manager.dispose().await;
    assert!(!handle.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_manager_from_settings() {
    let settings = Settings::default();
    let transport = Arc::new(MemoryTransport::with_auto_ack());
    let presenter = Arc::new(RecordingPresenter::new());
    let mut manager = RealtimeManager::from_settings(
        transport.clone(),
        Presenters::shared(presenter),
        &settings,
    );

    let handle = manager.start(ChatHandlers::new(), Some(UserId::from("u1")));
    let snapshot = settle(&handle).await;

    assert_eq!(snapshot.transport, transport.name());
    assert_eq!(snapshot.max_retries, settings.realtime.max_retries);
    assert!(snapshot.connected);
    assert!(snapshot.last_connected_at.is_some());
}
