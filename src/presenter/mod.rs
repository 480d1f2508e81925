//! UI feedback collaborators.
//!
//! The realtime manager only ever *requests* feedback; how a toast or a
//! desktop notification is rendered is up to the implementations here:
//!
//! - `LogPresenter`: headless presenter writing toasts to the log and keeping
//!   desktop notifications in a tag-keyed notification center
//! - `RecordingPresenter`: captures every request, for assertions in tests

mod log;
mod recording;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use log::LogPresenter;
pub use recording::RecordingPresenter;

/// Short-lived informational message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl Toast {
    pub fn info(title: impl Into<String>, duration: Duration) -> Self {
        Self {
            title: title.into(),
            description: None,
            duration,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What happens when the user clicks a desktop notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum ClickAction {
    /// Client-side navigation to the given path
    Navigate(String),
}

/// OS-level notification. A later notification with the same `tag`
/// replaces an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub on_click: ClickAction,
}

pub trait ToastPresenter: Send + Sync {
    fn show(&self, toast: Toast);
}

pub trait DesktopNotifier: Send + Sync {
    fn notify(&self, notification: DesktopNotification);
}

/// Both presenters bundled for injection into the manager
#[derive(Clone)]
pub struct Presenters {
    pub toasts: Arc<dyn ToastPresenter>,
    pub desktop: Arc<dyn DesktopNotifier>,
}

impl Presenters {
    pub fn new(toasts: Arc<dyn ToastPresenter>, desktop: Arc<dyn DesktopNotifier>) -> Self {
        Self { toasts, desktop }
    }

    /// Use one object for both roles
    pub fn shared<P>(presenter: Arc<P>) -> Self
    where
        P: ToastPresenter + DesktopNotifier + 'static,
    {
        Self {
            toasts: presenter.clone(),
            desktop: presenter,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(duration.as_millis() as u64)
    }
}
