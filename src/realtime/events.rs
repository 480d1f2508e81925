//! Inbound transport events and outbound change notifications.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Broadcast event name for a freshly created chat message
pub const MESSAGE_NEW_EVENT: &str = "message:new";

/// Identifier of one transport channel instance.
///
/// A new id is minted on every (re)subscription so that events emitted by a
/// channel that has since been torn down can be told apart from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the user owning a manager instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the given (possibly missing) id refers to this user
    pub fn matches(&self, other: Option<&str>) -> bool {
        other == Some(self.0.as_str())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Subscription status reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl SubscriptionStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, SubscriptionStatus::Subscribed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Subscribed => "SUBSCRIBED",
            SubscriptionStatus::ChannelError => "CHANNEL_ERROR",
            SubscriptionStatus::TimedOut => "TIMED_OUT",
            SubscriptionStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-level change type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "INSERT"),
            ChangeType::Update => write!(f, "UPDATE"),
            ChangeType::Delete => write!(f, "DELETE"),
        }
    }
}

/// Relations the chat channel listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTable {
    Conversation,
    ConversationMember,
    Message,
}

impl ChatTable {
    pub const ALL: [ChatTable; 3] = [
        ChatTable::Conversation,
        ChatTable::ConversationMember,
        ChatTable::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatTable::Conversation => "Conversation",
            ChatTable::ConversationMember => "ConversationMember",
            ChatTable::Message => "Message",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Conversation" => Some(ChatTable::Conversation),
            "ConversationMember" => Some(ChatTable::ConversationMember),
            "Message" => Some(ChatTable::Message),
            _ => None,
        }
    }
}

/// Application-level broadcast message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl BroadcastEnvelope {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Payload of a `message:new` broadcast. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
}

impl NewMessagePayload {
    /// Lenient extraction; a payload that is not an object yields all `None`
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Change-data-capture notification for one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    #[serde(rename = "eventType")]
    pub event_type: ChangeType,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    #[serde(default, deserialize_with = "row_image")]
    pub new: Map<String, Value>,
    #[serde(default, deserialize_with = "row_image")]
    pub old: Map<String, Value>,
}

fn default_schema() -> String {
    "public".to_string()
}

impl RowChange {
    pub fn new(event_type: ChangeType, table: ChatTable, new: Value, old: Value) -> Self {
        Self {
            event_type,
            schema: default_schema(),
            table: table.as_str().to_string(),
            new: into_object(new),
            old: into_object(old),
        }
    }

    pub fn chat_table(&self) -> Option<ChatTable> {
        ChatTable::parse(&self.table)
    }

    /// Read a string column from the new row image
    pub fn new_field(&self, name: &str) -> Option<String> {
        string_field(&self.new, name)
    }

    /// Read a column from the new row image, falling back to the old one
    /// (deletes only carry the old image)
    pub fn field(&self, name: &str) -> Option<String> {
        self.new_field(name).or_else(|| string_field(&self.old, name))
    }
}

/// A `null` or non-object image is treated as an empty row
fn row_image<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(into_object)
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn string_field(row: &Map<String, Value>, name: &str) -> Option<String> {
    match row.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Event produced by a transport channel
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub channel: ChannelId,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Status(SubscriptionStatus),
    Broadcast(BroadcastEnvelope),
    RowChange(RowChange),
}

impl TransportEvent {
    pub fn status(channel: ChannelId, status: SubscriptionStatus) -> Self {
        Self {
            channel,
            kind: TransportEventKind::Status(status),
        }
    }

    pub fn broadcast(channel: ChannelId, envelope: BroadcastEnvelope) -> Self {
        Self {
            channel,
            kind: TransportEventKind::Broadcast(envelope),
        }
    }

    pub fn row_change(channel: ChannelId, change: RowChange) -> Self {
        Self {
            channel,
            kind: TransportEventKind::RowChange(change),
        }
    }
}

/// Forwarded to the conversation-change handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationChange {
    pub event_type: Option<ChangeType>,
    pub conversation_id: Option<String>,
}

/// Forwarded to the message-change handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChange {
    pub event_type: Option<ChangeType>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
}
