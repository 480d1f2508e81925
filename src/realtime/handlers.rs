//! Caller-supplied change handlers.
//!
//! The manager never captures a handler at subscribe time. Handlers live in a
//! [`HandlerCell`] that the owner may overwrite at any moment; every dispatch
//! reads whatever is stored there at that instant.
//!
//! ```rust,ignore
//! let handlers = ChatHandlers::new()
//!     .on_conversation_change(|change| refresh_sidebar(change.conversation_id))
//!     .on_message_change(|change| refresh_thread(change.conversation_id));
//! ```

use std::fmt;
use std::sync::{Arc, RwLock};

use super::events::{ConversationChange, MessageChange};

pub type ConversationChangeFn = Arc<dyn Fn(ConversationChange) + Send + Sync>;
pub type MessageChangeFn = Arc<dyn Fn(MessageChange) + Send + Sync>;

/// Set of optional change callbacks
#[derive(Clone, Default)]
pub struct ChatHandlers {
    on_conversation_change: Option<ConversationChangeFn>,
    on_message_change: Option<MessageChangeFn>,
}

impl ChatHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_conversation_change<F>(mut self, f: F) -> Self
    where
        F: Fn(ConversationChange) + Send + Sync + 'static,
    {
        self.on_conversation_change = Some(Arc::new(f));
        self
    }

    pub fn on_message_change<F>(mut self, f: F) -> Self
    where
        F: Fn(MessageChange) + Send + Sync + 'static,
    {
        self.on_message_change = Some(Arc::new(f));
        self
    }

    pub fn has_conversation_handler(&self) -> bool {
        self.on_conversation_change.is_some()
    }

    pub fn has_message_handler(&self) -> bool {
        self.on_message_change.is_some()
    }
}

impl fmt::Debug for ChatHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatHandlers")
            .field("on_conversation_change", &self.has_conversation_handler())
            .field("on_message_change", &self.has_message_handler())
            .finish()
    }
}

/// Last-write-wins slot holding the current handlers
#[derive(Default)]
pub struct HandlerCell {
    current: RwLock<ChatHandlers>,
}

impl HandlerCell {
    pub fn new(handlers: ChatHandlers) -> Self {
        Self {
            current: RwLock::new(handlers),
        }
    }

    /// Replace the stored handlers
    pub fn replace(&self, handlers: ChatHandlers) {
        match self.current.write() {
            Ok(mut guard) => *guard = handlers,
            Err(poisoned) => *poisoned.into_inner() = handlers,
        }
    }

    fn snapshot(&self) -> ChatHandlers {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Invoke the current conversation handler. Returns whether one was set.
    pub fn conversation_changed(&self, change: ConversationChange) -> bool {
        // Clone out of the lock so a handler may call `replace` itself
        match self.snapshot().on_conversation_change {
            Some(f) => {
                f(change);
                true
            }
            None => false,
        }
    }

    /// Invoke the current message handler. Returns whether one was set.
    pub fn message_changed(&self, change: MessageChange) -> bool {
        match self.snapshot().on_message_change {
            Some(f) => {
                f(change);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::ChangeType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conversation(id: &str) -> ConversationChange {
        ConversationChange {
            event_type: Some(ChangeType::Update),
            conversation_id: Some(id.to_string()),
        }
    }

    #[test]
    fn test_empty_cell_dispatches_nothing() {
        let cell = HandlerCell::default();
        assert!(!cell.conversation_changed(conversation("c1")));
        assert!(!cell.message_changed(MessageChange {
            event_type: None,
            message_id: None,
            conversation_id: None,
        }));
    }

    #[test]
    fn test_replace_routes_to_latest() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        let cell = HandlerCell::new(
            ChatHandlers::new().on_conversation_change(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            }),
        );
        cell.conversation_changed(conversation("c1"));

        let s = second.clone();
        cell.replace(ChatHandlers::new().on_conversation_change(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        cell.conversation_changed(conversation("c2"));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_replace_itself() {
        let cell = Arc::new(HandlerCell::default());
        let inner = cell.clone();
        cell.replace(ChatHandlers::new().on_conversation_change(move |_| {
            inner.replace(ChatHandlers::new());
        }));

        assert!(cell.conversation_changed(conversation("c1")));
        assert!(!cell.conversation_changed(conversation("c1")));
    }

    #[test]
    fn test_debug_hides_closures() {
        let handlers = ChatHandlers::new().on_message_change(|_| {});
        let rendered = format!("{:?}", handlers);
        assert!(rendered.contains("on_message_change: true"));
        assert!(rendered.contains("on_conversation_change: false"));
    }
}
