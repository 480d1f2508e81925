//! In-process loopback transport.
//!
//! Channels live in a DashMap; publishers call `publish_*`/`emit_*` directly.
//! Failure injection hooks make it usable as a test double for the manager.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::realtime::{
    BroadcastEnvelope, ChannelId, RowChange, SubscriptionStatus, TransportEvent,
};

use super::{ChannelHandle, ChannelSpec, EventSink, Transport, TransportError};

struct MemoryChannel {
    spec: ChannelSpec,
    sink: EventSink,
}

pub struct MemoryTransport {
    channels: DashMap<ChannelId, MemoryChannel>,
    /// Acknowledge every subscription immediately
    auto_ack: bool,
    /// Upcoming subscribe calls to reject
    failing_subscribes: AtomicUsize,
    failing_removals: AtomicBool,
    subscribe_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    latest: Mutex<Option<ChannelId>>,
}

impl MemoryTransport {
    /// Transport that leaves acknowledgment to the caller (`emit_status`)
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            auto_ack: false,
            failing_subscribes: AtomicUsize::new(0),
            failing_removals: AtomicBool::new(false),
            subscribe_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            latest: Mutex::new(None),
        }
    }

    /// Transport that acknowledges every subscription right away
    pub fn with_auto_ack() -> Self {
        Self {
            auto_ack: true,
            ..Self::new()
        }
    }

    /// Reject the next `count` subscribe calls
    pub fn fail_next_subscribes(&self, count: usize) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Make `remove_channel` fail (the channel is still dropped)
    pub fn fail_removals(&self, fail: bool) {
        self.failing_removals.store(fail, Ordering::SeqCst);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn remove_count(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    /// Number of channels currently alive
    pub fn live_channels(&self) -> usize {
        self.channels.len()
    }

    /// Most recently created channel, if still alive
    pub fn latest_channel(&self) -> Option<ChannelId> {
        let latest = self.latest.lock().ok().and_then(|l| *l)?;
        self.channels.contains_key(&latest).then_some(latest)
    }

    /// Report a status on the most recent live channel
    pub fn emit_status(&self, status: SubscriptionStatus) -> bool {
        match self.latest_channel() {
            Some(id) => self.emit_status_to(id, status),
            None => false,
        }
    }

    /// Report a status on a specific channel (live or not)
    pub fn emit_status_to(&self, id: ChannelId, status: SubscriptionStatus) -> bool {
        match self.channels.get(&id) {
            Some(channel) => channel
                .sink
                .send(TransportEvent::status(id, status))
                .is_ok(),
            None => false,
        }
    }

    /// Deliver a broadcast to every live channel listening for it
    pub fn publish_broadcast(&self, envelope: BroadcastEnvelope) -> usize {
        self.deliver(|id, channel| {
            channel
                .spec
                .accepts_broadcast(&envelope)
                .then(|| TransportEvent::broadcast(id, envelope.clone()))
        })
    }

    /// Deliver a row change to every live channel watching its table
    pub fn publish_change(&self, change: RowChange) -> usize {
        self.deliver(|id, channel| {
            channel
                .spec
                .accepts_change(&change)
                .then(|| TransportEvent::row_change(id, change.clone()))
        })
    }

    fn deliver<F>(&self, build: F) -> usize
    where
        F: Fn(ChannelId, &MemoryChannel) -> Option<TransportEvent>,
    {
        let mut delivered = 0;
        for entry in self.channels.iter() {
            if let Some(event) = build(*entry.key(), entry.value()) {
                if entry.value().sink.send(event).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(
        &self,
        spec: ChannelSpec,
        events: EventSink,
    ) -> Result<ChannelHandle, TransportError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        let rejected = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(TransportError::Rejected(format!(
                "memory transport refused channel {}",
                spec.name
            )));
        }

        let id = ChannelId::new();
        let handle = ChannelHandle::new(id, spec.name.clone());

        if self.auto_ack {
            let _ = events.send(TransportEvent::status(id, SubscriptionStatus::Subscribed));
        }

        self.channels.insert(id, MemoryChannel { spec, sink: events });
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(id);
        }

        tracing::debug!(channel_id = %id, "Memory channel created");
        Ok(handle)
    }

    async fn remove_channel(&self, handle: ChannelHandle) -> Result<(), TransportError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);

        let id = handle.id();
        let (_, channel) = self
            .channels
            .remove(&id)
            .ok_or(TransportError::UnknownChannel(id))?;

        // Like a real transport, a removed channel reports that it closed
        let _ = channel
            .sink
            .send(TransportEvent::status(id, SubscriptionStatus::Closed));

        if self.failing_removals.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(format!(
                "memory transport failed to remove channel {}",
                id
            )));
        }

        tracing::debug!(channel_id = %id, "Memory channel removed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeType, ChatTable, TransportEventKind};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let transport = MemoryTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = transport
            .subscribe(ChannelSpec::chat("chat"), tx)
            .await
            .unwrap();
        assert_eq!(transport.live_channels(), 1);
        assert_eq!(transport.latest_channel(), Some(handle.id()));

        let delivered = transport.publish_change(RowChange::new(
            ChangeType::Insert,
            ChatTable::Conversation,
            json!({"id": "c1"}),
            Value::Null,
        ));
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.channel, handle.id());
        assert!(matches!(event.kind, TransportEventKind::RowChange(_)));
    }

    #[tokio::test]
    async fn test_auto_ack() {
        let transport = MemoryTransport::with_auto_ack();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = transport
            .subscribe(ChannelSpec::chat("chat"), tx)
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::status(handle.id(), SubscriptionStatus::Subscribed)
        );
    }

    #[tokio::test]
    async fn test_unlistened_broadcast_is_not_delivered() {
        let transport = MemoryTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        transport
            .subscribe(ChannelSpec::chat("chat"), tx)
            .await
            .unwrap();

        let delivered = transport.publish_broadcast(BroadcastEnvelope::new("typing", json!({})));
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_failing_subscribes() {
        let transport = MemoryTransport::new();
        transport.fail_next_subscribes(1);

        let (tx, _rx) = mpsc::unbounded_channel();
        let first = transport.subscribe(ChannelSpec::chat("chat"), tx.clone()).await;
        assert!(matches!(first, Err(TransportError::Rejected(_))));

        let second = transport.subscribe(ChannelSpec::chat("chat"), tx).await;
        assert!(second.is_ok());
        assert_eq!(transport.subscribe_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_reports_closed() {
        let transport = MemoryTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = transport
            .subscribe(ChannelSpec::chat("chat"), tx)
            .await
            .unwrap();
        let id = handle.id();

        transport.remove_channel(handle).await.unwrap();
        assert_eq!(transport.live_channels(), 0);
        assert_eq!(transport.latest_channel(), None);
        assert!(!transport.emit_status(SubscriptionStatus::Subscribed));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, TransportEvent::status(id, SubscriptionStatus::Closed));
    }

    #[tokio::test]
    async fn test_remove_unknown_channel() {
        let transport = MemoryTransport::new();
        let handle = ChannelHandle::new(ChannelId::new(), "ghost");
        let result = transport.remove_channel(handle).await;
        assert!(matches!(result, Err(TransportError::UnknownChannel(_))));
    }
}
