//! Publish/subscribe transports.
//!
//! A transport turns a [`ChannelSpec`] into a live channel and reports what
//! happens on it as [`TransportEvent`]s: status changes, broadcasts and row
//! changes. Two backends are provided:
//!
//! - `MemoryTransport`: in-process loopback, used by tests and local runs
//! - `RedisTransport`: Redis Pub/Sub with JSON envelopes
//!
//! Use `create_transport()` to pick one from configuration.

mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::realtime::{
    BroadcastEnvelope, ChannelId, ChatTable, RowChange, TransportEvent, MESSAGE_NEW_EVENT,
};

pub use self::memory::MemoryTransport;
pub use self::redis::{RedisTransport, WireMessage};

/// Where a channel delivers its events
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The transport did not acknowledge in time
    #[error("Subscription timed out after {0:?}")]
    Timeout(Duration),

    /// The channel was never created here or was already removed
    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// The transport refused to create the channel
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    /// The transport is shut down
    #[error("Transport closed")]
    Closed,
}

/// What a channel listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Logical channel name
    pub name: String,
    /// Broadcast event names to deliver
    pub broadcast_events: Vec<String>,
    /// Schema the watched relations live in
    pub schema: String,
    /// Relations whose row changes are delivered
    pub tables: Vec<ChatTable>,
}

impl ChannelSpec {
    /// Channel carrying everything the chat view needs
    pub fn chat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            broadcast_events: vec![MESSAGE_NEW_EVENT.to_string()],
            schema: "public".to_string(),
            tables: ChatTable::ALL.to_vec(),
        }
    }

    pub fn accepts_broadcast(&self, envelope: &BroadcastEnvelope) -> bool {
        self.broadcast_events.iter().any(|e| *e == envelope.event)
    }

    pub fn accepts_change(&self, change: &RowChange) -> bool {
        change.schema == self.schema
            && change
                .chat_table()
                .map(|t| self.tables.contains(&t))
                .unwrap_or(false)
    }
}

/// Exclusive reference to a live channel. Not `Clone`: whoever holds it is
/// the only party allowed to remove the channel.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelHandle {
    id: ChannelId,
    name: String,
}

impl ChannelHandle {
    pub(crate) fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Create a channel. The acknowledgment arrives later on `events` as a
    /// `SUBSCRIBED` status (or a failure status).
    async fn subscribe(
        &self,
        spec: ChannelSpec,
        events: EventSink,
    ) -> Result<ChannelHandle, TransportError>;

    /// Release a channel
    async fn remove_channel(&self, handle: ChannelHandle) -> Result<(), TransportError>;

    /// Backend name, for logs and status output
    fn name(&self) -> &'static str;
}

/// Create a transport based on configuration.
///
/// - `"redis"`: Redis Pub/Sub at `redis.url`
/// - anything else: an auto-acknowledging in-memory loopback
pub fn create_transport(settings: &Settings) -> Result<Arc<dyn Transport>, TransportError> {
    match settings.realtime.transport.as_str() {
        "redis" => {
            tracing::info!(
                backend = "redis",
                url = %settings.redis.url,
                prefix = %settings.redis.channel_prefix,
                "Creating Redis transport"
            );
            let transport = RedisTransport::new(
                settings.redis.clone(),
                settings.realtime.subscribe_timeout(),
            )?;
            Ok(Arc::new(transport))
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory transport");
            Ok(Arc::new(MemoryTransport::with_auto_ack()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::ChangeType;
    use serde_json::{json, Value};

    #[test]
    fn test_chat_spec_filters() {
        let spec = ChannelSpec::chat("chat");

        assert!(spec.accepts_broadcast(&BroadcastEnvelope::new("message:new", json!({}))));
        assert!(!spec.accepts_broadcast(&BroadcastEnvelope::new("typing", json!({}))));

        let message = RowChange::new(ChangeType::Insert, ChatTable::Message, json!({}), Value::Null);
        assert!(spec.accepts_change(&message));

        let mut other_schema = message.clone();
        other_schema.schema = "audit".to_string();
        assert!(!spec.accepts_change(&other_schema));

        let mut unknown_table = message;
        unknown_table.table = "Timesheet".to_string();
        assert!(!spec.accepts_change(&unknown_table));
    }

    #[test]
    fn test_create_memory_transport_by_default() {
        let settings = Settings::default();
        let transport = create_transport(&settings).unwrap();
        assert_eq!(transport.name(), "memory");
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Rejected("quota".to_string());
        assert_eq!(err.to_string(), "Subscription rejected: quota");
        assert_eq!(TransportError::Closed.to_string(), "Transport closed");
    }
}
