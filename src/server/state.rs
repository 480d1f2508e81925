use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::presenter::LogPresenter;
use crate::realtime::RealtimeHandle;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Detached when no user identity is configured
    pub realtime: RealtimeHandle,
    pub presenter: Arc<LogPresenter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, realtime: RealtimeHandle, presenter: Arc<LogPresenter>) -> Self {
        Self {
            settings: Arc::new(settings),
            realtime,
            presenter,
            start_time: Instant::now(),
        }
    }
}
