//! Headless presenter backed by tracing

use dashmap::DashMap;

use super::{DesktopNotification, DesktopNotifier, Toast, ToastPresenter};

/// Logs toasts and keeps the currently visible desktop notifications,
/// one per tag.
#[derive(Default)]
pub struct LogPresenter {
    active: DashMap<String, DesktopNotification>,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct notifications currently shown
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self, tag: &str) -> Option<DesktopNotification> {
        self.active.get(tag).map(|n| n.value().clone())
    }

    /// All shown notifications, ordered by tag
    pub fn list(&self) -> Vec<DesktopNotification> {
        let mut all: Vec<_> = self.active.iter().map(|n| n.value().clone()).collect();
        all.sort_by(|a, b| a.tag.cmp(&b.tag));
        all
    }

    /// Simulate the user clicking a notification; returns its action target
    pub fn click(&self, tag: &str) -> Option<String> {
        let (_, notification) = self.active.remove(tag)?;
        let super::ClickAction::Navigate(path) = notification.on_click;
        tracing::info!(tag = %tag, path = %path, "Desktop notification clicked");
        Some(path)
    }
}

impl ToastPresenter for LogPresenter {
    fn show(&self, toast: Toast) {
        tracing::info!(
            title = %toast.title,
            description = toast.description.as_deref().unwrap_or(""),
            duration_ms = toast.duration.as_millis() as u64,
            "Toast"
        );
    }
}

impl DesktopNotifier for LogPresenter {
    fn notify(&self, notification: DesktopNotification) {
        let tag = notification.tag.clone();
        let replaced = self.active.insert(tag.clone(), notification).is_some();

        tracing::info!(
            tag = %tag,
            replaced = replaced,
            "Desktop notification"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::ClickAction;

    fn notification(tag: &str, body: &str) -> DesktopNotification {
        DesktopNotification {
            title: "New message".to_string(),
            body: body.to_string(),
            tag: tag.to_string(),
            on_click: ClickAction::Navigate(format!("/chat?conversationId={}", tag)),
        }
    }

    #[test]
    fn test_same_tag_replaces() {
        let presenter = LogPresenter::new();
        presenter.notify(notification("c1", "first"));
        presenter.notify(notification("c1", "second"));
        presenter.notify(notification("c2", "other"));

        assert_eq!(presenter.active_count(), 2);
        assert_eq!(presenter.active("c1").unwrap().body, "second");
    }

    #[test]
    fn test_click_navigates_and_dismisses() {
        let presenter = LogPresenter::new();
        presenter.notify(notification("c1", "hello"));

        assert_eq!(
            presenter.click("c1"),
            Some("/chat?conversationId=c1".to_string())
        );
        assert_eq!(presenter.active_count(), 0);
        assert_eq!(presenter.click("c1"), None);
    }
}
