use std::sync::Mutex;

use super::{DesktopNotification, DesktopNotifier, Toast, ToastPresenter};

/// Presenter that remembers every request in arrival order
#[derive(Default)]
pub struct RecordingPresenter {
    toasts: Mutex<Vec<Toast>>,
    notifications: Mutex<Vec<DesktopNotification>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<DesktopNotification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut t) = self.toasts.lock() {
            t.clear();
        }
        if let Ok(mut n) = self.notifications.lock() {
            n.clear();
        }
    }
}

impl ToastPresenter for RecordingPresenter {
    fn show(&self, toast: Toast) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(toast);
        }
    }
}

impl DesktopNotifier for RecordingPresenter {
    fn notify(&self, notification: DesktopNotification) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push(notification);
        }
    }
}
