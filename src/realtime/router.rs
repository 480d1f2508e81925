//! Routes transport events to the caller's handlers and to UI feedback.

use std::sync::Arc;
use std::time::Duration;

use crate::config::PresentationConfig;
use crate::metrics::EventMetrics;
use crate::presenter::{ClickAction, DesktopNotification, Presenters, Toast};

use super::events::{
    BroadcastEnvelope, ChangeType, ChatTable, ConversationChange, MessageChange,
    NewMessagePayload, RowChange, UserId, MESSAGE_NEW_EVENT,
};
use super::handlers::HandlerCell;

/// Longest message excerpt shown in a desktop notification
const NOTIFICATION_BODY_MAX_CHARS: usize = 120;

/// Result of routing one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Forwarded to a handler; `liveness` marks a delivered row change
    Delivered { liveness: bool },
    /// Self-originated broadcast, dropped
    Suppressed,
    /// Event or relation this router does not know
    Ignored,
}

pub struct EventRouter {
    identity: UserId,
    handlers: Arc<HandlerCell>,
    presenters: Presenters,
    presentation: PresentationConfig,
}

impl EventRouter {
    pub fn new(
        identity: UserId,
        handlers: Arc<HandlerCell>,
        presenters: Presenters,
        presentation: PresentationConfig,
    ) -> Self {
        Self {
            identity,
            handlers,
            presenters,
            presentation,
        }
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Route an application broadcast
    pub fn route_broadcast(&self, envelope: &BroadcastEnvelope) -> RouteOutcome {
        if envelope.event != MESSAGE_NEW_EVENT {
            tracing::debug!(event = %envelope.event, "Ignoring unknown broadcast event");
            return RouteOutcome::Ignored;
        }
        EventMetrics::record_received("broadcast");

        let payload = NewMessagePayload::from_value(&envelope.payload);

        // Our own writes are already reflected locally
        if self.identity.matches(payload.sender_id.as_deref()) {
            EventMetrics::record_suppressed();
            tracing::trace!(message_id = ?payload.message_id, "Suppressed self-originated broadcast");
            return RouteOutcome::Suppressed;
        }

        self.message_changed(MessageChange {
            event_type: Some(ChangeType::Insert),
            message_id: payload.message_id,
            conversation_id: payload.conversation_id,
        });

        RouteOutcome::Delivered { liveness: false }
    }

    /// Route a row-change notification
    pub fn route_change(&self, change: &RowChange) -> RouteOutcome {
        let table = match change.chat_table() {
            Some(t) => t,
            None => {
                tracing::debug!(table = %change.table, "Ignoring change on unknown relation");
                return RouteOutcome::Ignored;
            }
        };

        match table {
            ChatTable::Conversation => self.conversation_row(change),
            ChatTable::ConversationMember => self.member_row(change),
            ChatTable::Message => self.message_row(change),
        }

        RouteOutcome::Delivered { liveness: true }
    }

    fn conversation_row(&self, change: &RowChange) {
        EventMetrics::record_received("conversation");

        let title = match change.event_type {
            ChangeType::Insert => Some("New conversation created"),
            ChangeType::Delete => Some("Conversation deleted"),
            ChangeType::Update => None,
        };
        if let Some(title) = title {
            self.toast(title, None, self.presentation.conversation_toast_ms);
        }

        self.conversation_changed(ConversationChange {
            event_type: Some(change.event_type),
            conversation_id: change.field("id"),
        });
    }

    fn member_row(&self, change: &RowChange) {
        EventMetrics::record_received("conversation_member");

        if change.event_type == ChangeType::Insert
            && self.identity.matches(change.new_field("userId").as_deref())
        {
            self.toast(
                "You were added to a conversation",
                None,
                self.presentation.member_toast_ms,
            );
        }

        // Membership changes surface as an update of the conversation
        self.conversation_changed(ConversationChange {
            event_type: Some(ChangeType::Update),
            conversation_id: change.field("conversationId"),
        });
    }

    fn message_row(&self, change: &RowChange) {
        EventMetrics::record_received("message");

        let message_id = change.field("id");
        let conversation_id = change.field("conversationId");

        if change.event_type == ChangeType::Insert
            && !self.identity.matches(change.new_field("senderId").as_deref())
        {
            let excerpt = change.new_field("content").map(|c| excerpt(&c));
            self.toast(
                "New message",
                excerpt.clone(),
                self.presentation.message_toast_ms,
            );

            match conversation_id.as_deref() {
                Some(conversation) => self.presenters.desktop.notify(DesktopNotification {
                    title: "New message".to_string(),
                    body: excerpt.unwrap_or_else(|| "You have a new message".to_string()),
                    tag: conversation.to_string(),
                    on_click: ClickAction::Navigate(
                        self.presentation.conversation_link(conversation),
                    ),
                }),
                None => {
                    tracing::debug!(message_id = ?message_id, "Message without conversation id, no desktop notification");
                }
            }
        }

        self.message_changed(MessageChange {
            event_type: Some(change.event_type),
            message_id,
            conversation_id,
        });
    }

    fn toast(&self, title: &str, description: Option<String>, duration_ms: u64) {
        let mut toast = Toast::info(title, Duration::from_millis(duration_ms));
        if let Some(description) = description {
            toast = toast.with_description(description);
        }
        self.presenters.toasts.show(toast);
    }

    fn conversation_changed(&self, change: ConversationChange) {
        if self.handlers.conversation_changed(change) {
            EventMetrics::record_conversation_dispatch();
        }
    }

    fn message_changed(&self, change: MessageChange) {
        if self.handlers.message_changed(change) {
            EventMetrics::record_message_dispatch();
        }
    }
}

fn excerpt(content: &str) -> String {
    if content.chars().count() <= NOTIFICATION_BODY_MAX_CHARS {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(NOTIFICATION_BODY_MAX_CHARS).collect();
    cut.push('…');
    cut
}
