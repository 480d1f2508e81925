//! Realtime chat subscription.
//!
//! - `events`: transport events and the changes forwarded to callers
//! - `backoff`: retry delay computation
//! - `state`: reconnection state machine
//! - `handlers`: caller callbacks, swappable without resubscribing
//! - `router`: turns events into handler calls, toasts and notifications
//! - `manager`: the session task tying it all together

mod backoff;
mod events;
mod handlers;
mod manager;
mod router;
mod state;

pub use backoff::{BackoffConfig, RetryBackoff};
pub use events::{
    BroadcastEnvelope, ChangeType, ChannelId, ChatTable, ConversationChange, MessageChange,
    NewMessagePayload, RowChange, SubscriptionStatus, TransportEvent, TransportEventKind, UserId,
    MESSAGE_NEW_EVENT,
};
pub use handlers::{ChatHandlers, ConversationChangeFn, HandlerCell, MessageChangeFn};
pub use manager::{ConnectionSnapshot, EnvironmentSignal, RealtimeHandle, RealtimeManager};
pub use router::{EventRouter, RouteOutcome};
pub use state::{ConnectionState, FailureAction, ReconnectSupervisor, SupervisorStats};
