use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::config::RedisConfig;
use crate::realtime::{
    BroadcastEnvelope, ChannelId, RowChange, SubscriptionStatus, TransportEvent,
};

use super::{ChannelHandle, ChannelSpec, EventSink, Transport, TransportError};

/// Message format carried on a Redis Pub/Sub channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Application-level broadcast
    Broadcast(BroadcastEnvelope),
    /// Row change captured from the database
    PostgresChanges(RowChange),
}

/// Redis Pub/Sub transport.
///
/// Every channel gets a dedicated Pub/Sub connection driven by its own task;
/// removing the channel signals that task to stop.
pub struct RedisTransport {
    client: redis::Client,
    config: RedisConfig,
    subscribe_timeout: Duration,
    channels: DashMap<ChannelId, oneshot::Sender<()>>,
}

impl RedisTransport {
    /// Create a new Redis transport
    pub fn new(config: RedisConfig, subscribe_timeout: Duration) -> Result<Self, TransportError> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            config,
            subscribe_timeout,
            channels: DashMap::new(),
        })
    }

    /// Pub/Sub channel name for a logical channel
    pub fn topic(&self, channel: &str) -> String {
        format!("{}:{}", self.config.channel_prefix, channel)
    }

    /// Number of channels with a running task
    pub fn live_channels(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn subscribe(
        &self,
        spec: ChannelSpec,
        events: EventSink,
    ) -> Result<ChannelHandle, TransportError> {
        let id = ChannelId::new();
        let topic = self.topic(&spec.name);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.channels.insert(id, shutdown_tx);

        let task = ChannelTask {
            id,
            client: self.client.clone(),
            topic,
            spec: spec.clone(),
            events,
            subscribe_timeout: self.subscribe_timeout,
        };
        tokio::spawn(task.run(shutdown_rx));

        Ok(ChannelHandle::new(id, spec.name))
    }

    async fn remove_channel(&self, handle: ChannelHandle) -> Result<(), TransportError> {
        let id = handle.id();
        let (_, shutdown) = self
            .channels
            .remove(&id)
            .ok_or(TransportError::UnknownChannel(id))?;

        // The task may already have exited on its own
        let _ = shutdown.send(());
        tracing::debug!(channel_id = %id, "Redis channel removed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Background task owning one Pub/Sub connection
struct ChannelTask {
    id: ChannelId,
    client: redis::Client,
    topic: String,
    spec: ChannelSpec,
    events: EventSink,
    subscribe_timeout: Duration,
}

impl ChannelTask {
    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let connect = async {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(&self.topic).await?;
            Ok::<_, redis::RedisError>(pubsub)
        };

        let connected = tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!(channel_id = %self.id, "Channel removed before subscription completed");
                return;
            }
            result = tokio::time::timeout(self.subscribe_timeout, connect) => result,
        };

        let mut pubsub = match connected {
            Ok(Ok(pubsub)) => pubsub,
            Ok(Err(e)) => {
                let err = TransportError::from(e);
                tracing::warn!(channel_id = %self.id, topic = %self.topic, error = %err, "Redis subscription failed");
                self.report(SubscriptionStatus::ChannelError);
                return;
            }
            Err(_) => {
                let err = TransportError::Timeout(self.subscribe_timeout);
                tracing::warn!(channel_id = %self.id, topic = %self.topic, error = %err, "Redis subscription failed");
                self.report(SubscriptionStatus::TimedOut);
                return;
            }
        };

        tracing::info!(channel_id = %self.id, topic = %self.topic, "Redis subscription established");
        self.report(SubscriptionStatus::Subscribed);

        let mut message_stream = pubsub.on_message();

        loop {
            tokio::select! {
                // Handle removal
                _ = &mut shutdown_rx => {
                    tracing::debug!(channel_id = %self.id, "Channel task stopping");
                    self.report(SubscriptionStatus::Closed);
                    break;
                }
                // Handle incoming messages
                msg = message_stream.next() => {
                    match msg {
                        Some(msg) => {
                            let payload: String = match msg.get_payload() {
                                Ok(p) => p,
                                Err(e) => {
                                    tracing::warn!(error = %e, "Failed to get message payload");
                                    continue;
                                }
                            };

                            self.handle_payload(&payload);
                        }
                        None => {
                            tracing::warn!(channel_id = %self.id, "Redis message stream ended");
                            self.report(SubscriptionStatus::Closed);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn report(&self, status: SubscriptionStatus) {
        let _ = self.events.send(TransportEvent::status(self.id, status));
    }

    fn handle_payload(&self, payload: &str) {
        if let Some(event) = decode_payload(self.id, &self.spec, &self.topic, payload) {
            let _ = self.events.send(event);
        }
    }
}

/// Parse and filter one Pub/Sub payload
fn decode_payload(
    id: ChannelId,
    spec: &ChannelSpec,
    topic: &str,
    payload: &str,
) -> Option<TransportEvent> {
    let message: WireMessage = match serde_json::from_str(payload) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(
                error = %e,
                topic = %topic,
                payload = %payload,
                "Failed to parse Redis message"
            );
            return None;
        }
    };

    match message {
        WireMessage::Broadcast(envelope) if spec.accepts_broadcast(&envelope) => {
            Some(TransportEvent::broadcast(id, envelope))
        }
        WireMessage::PostgresChanges(change) if spec.accepts_change(&change) => {
            Some(TransportEvent::row_change(id, change))
        }
        _ => {
            tracing::trace!(topic = %topic, "Ignoring message the channel does not listen for");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeType, TransportEventKind};

    #[test]
    fn test_parse_broadcast_message() {
        let json = r#"{
            "type": "broadcast",
            "event": "message:new",
            "payload": {"messageId": "m1", "conversationId": "c1", "senderId": "u2"}
        }"#;

        let message: WireMessage = serde_json::from_str(json).unwrap();
        match message {
            WireMessage::Broadcast(envelope) => {
                assert_eq!(envelope.event, "message:new");
                assert_eq!(envelope.payload["senderId"], "u2");
            }
            _ => panic!("Expected broadcast"),
        }
    }

    #[test]
    fn test_parse_postgres_changes_message() {
        let json = r#"{
            "type": "postgres_changes",
            "eventType": "DELETE",
            "schema": "public",
            "table": "Conversation",
            "new": {},
            "old": {"id": "c1"}
        }"#;

        let message: WireMessage = serde_json::from_str(json).unwrap();
        match message {
            WireMessage::PostgresChanges(change) => {
                assert_eq!(change.event_type, ChangeType::Delete);
                assert_eq!(change.field("id"), Some("c1".to_string()));
            }
            _ => panic!("Expected postgres_changes"),
        }
    }

    #[test]
    fn test_decode_filters_by_spec() {
        let spec = ChannelSpec::chat("chat");
        let id = ChannelId::new();

        let accepted = decode_payload(
            id,
            &spec,
            "realtime:chat",
            r#"{"type": "postgres_changes", "eventType": "INSERT", "table": "Message", "new": {"id": "m1"}}"#,
        )
        .unwrap();
        assert_eq!(accepted.channel, id);
        assert!(matches!(accepted.kind, TransportEventKind::RowChange(_)));

        let ignored = decode_payload(
            id,
            &spec,
            "realtime:chat",
            r#"{"type": "postgres_changes", "eventType": "INSERT", "table": "Timesheet"}"#,
        );
        assert!(ignored.is_none());

        let garbage = decode_payload(id, &spec, "realtime:chat", "not json");
        assert!(garbage.is_none());
    }

    #[test]
    fn test_decode_delete_with_null_new_image() {
        let spec = ChannelSpec::chat("chat");
        let id = ChannelId::new();

        let event = decode_payload(
            id,
            &spec,
            "realtime:chat",
            r#"{"type": "postgres_changes", "eventType": "DELETE", "schema": "public", "table": "Message", "new": null, "old": {"id": "m1", "conversationId": "c1"}}"#,
        )
        .unwrap();

        match event.kind {
            TransportEventKind::RowChange(change) => {
                assert_eq!(change.event_type, ChangeType::Delete);
                assert!(change.new.is_empty());
                assert_eq!(change.field("id"), Some("m1".to_string()));
                assert_eq!(change.field("conversationId"), Some("c1".to_string()));
            }
            other => panic!("Expected row change, got {:?}", other),
        }
    }

    #[test]
    fn test_topic_uses_prefix() {
        let transport =
            RedisTransport::new(RedisConfig::default(), Duration::from_secs(1)).unwrap();
        assert_eq!(transport.topic("chat"), "realtime:chat");
        assert_eq!(transport.name(), "redis");
        assert_eq!(transport.live_channels(), 0);
    }

    #[test]
    fn test_wire_message_serializes_with_tag() {
        let message = WireMessage::Broadcast(BroadcastEnvelope::new(
            "message:new",
            serde_json::json!({"messageId": "m1"}),
        ));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "broadcast");
        assert_eq!(json["event"], "message:new");
    }
}
