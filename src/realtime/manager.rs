//! Realtime connection manager.
//!
//! One [`RealtimeManager`] exists per consumer. While an identity is known it
//! runs a session task that owns every piece of connection state: the live
//! channel handle, the reconnect supervisor and the retry timer. Callers talk
//! to the task through a cheap, cloneable [`RealtimeHandle`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;

use crate::config::{PresentationConfig, RealtimeConfig, Settings};
use crate::metrics::{EventMetrics, SessionMetrics};
use crate::presenter::Presenters;
use crate::transport::{ChannelHandle, ChannelSpec, EventSink, Transport};

use super::backoff::RetryBackoff;
use super::events::{ChannelId, SubscriptionStatus, TransportEvent, TransportEventKind, UserId};
use super::handlers::{ChatHandlers, HandlerCell};
use super::router::{EventRouter, RouteOutcome};
use super::state::{ConnectionState, FailureAction, ReconnectSupervisor, SupervisorStats};

/// Environment trigger delivered to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    /// The view became visible again
    Visible,
    /// Network connectivity came back
    Online,
    /// Explicit user request
    ManualReconnect,
}

impl EnvironmentSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentSignal::Visible => "visible",
            EnvironmentSignal::Online => "online",
            EnvironmentSignal::ManualReconnect => "manual",
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub user_id: UserId,
    pub transport: &'static str,
    pub state: ConnectionState,
    pub connected: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Delay chosen for the pending retry, if one is scheduled
    pub pending_retry_ms: Option<u64>,
    pub channel_id: Option<ChannelId>,
    pub stats: SupervisorStats,
    pub events_dispatched: u64,
    pub events_suppressed: u64,
    pub stale_events: u64,
    pub last_connected_at: Option<DateTime<Utc>>,
}

enum Command {
    Setup,
    Reconnect,
    Signal(EnvironmentSignal),
    Snapshot(oneshot::Sender<ConnectionSnapshot>),
    Dispose,
}

/// Caller side of a session.
///
/// All methods are fire-and-forget except `snapshot`. A handle outlives its
/// session safely: once the session is gone, commands are dropped and the
/// connected flag stays `false`.
#[derive(Clone)]
pub struct RealtimeHandle {
    commands: Option<mpsc::UnboundedSender<Command>>,
    connected: watch::Receiver<bool>,
}

impl RealtimeHandle {
    /// Handle with no session behind it
    pub fn detached() -> Self {
        let (_, connected) = watch::channel(false);
        Self {
            commands: None,
            connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Receiver that observes every change of the connected flag
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Reset the retry counter, drop the current channel and subscribe again
    /// right away.
    pub fn reconnect(&self) {
        self.send(Command::Reconnect);
    }

    /// Subscribe unless a channel is already active or being set up
    pub fn ensure_subscribed(&self) {
        self.send(Command::Setup);
    }

    pub fn signal(&self, signal: EnvironmentSignal) {
        self.send(Command::Signal(signal));
    }

    /// Current session state, or `None` once the session has stopped
    pub async fn snapshot(&self) -> Option<ConnectionSnapshot> {
        let commands = self.commands.as_ref()?;
        let (tx, rx) = oneshot::channel();
        commands.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Whether a session task is still accepting commands
    pub fn is_active(&self) -> bool {
        self.commands
            .as_ref()
            .map(|c| !c.is_closed())
            .unwrap_or(false)
    }

    fn send(&self, command: Command) {
        if let Some(commands) = &self.commands {
            // Session already stopped
            let _ = commands.send(command);
        }
    }
}

struct ActiveSession {
    identity: UserId,
    handle: RealtimeHandle,
    task: JoinHandle<()>,
}

/// Owns the session for one consumer.
///
/// `start` may be called again with new handlers at any time: handlers are
/// swapped in place and the subscription is left untouched. A different
/// identity restarts the session and no identity stops it.
pub struct RealtimeManager {
    transport: Arc<dyn Transport>,
    presenters: Presenters,
    realtime: RealtimeConfig,
    presentation: PresentationConfig,
    handlers: Arc<HandlerCell>,
    session: Option<ActiveSession>,
}

impl RealtimeManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        presenters: Presenters,
        realtime: RealtimeConfig,
        presentation: PresentationConfig,
    ) -> Self {
        Self {
            transport,
            presenters,
            realtime,
            presentation,
            handlers: Arc::new(HandlerCell::default()),
            session: None,
        }
    }

    pub fn from_settings(
        transport: Arc<dyn Transport>,
        presenters: Presenters,
        settings: &Settings,
    ) -> Self {
        Self::new(
            transport,
            presenters,
            settings.realtime.clone(),
            settings.presentation.clone(),
        )
    }

    /// Start (or refresh) the session. Must be called from within a tokio
    /// runtime.
    pub fn start(&mut self, handlers: ChatHandlers, identity: Option<UserId>) -> RealtimeHandle {
        self.handlers.replace(handlers);

        let identity = match identity {
            Some(identity) => identity,
            None => {
                self.stop_session();
                return RealtimeHandle::detached();
            }
        };

        if let Some(session) = &self.session {
            if session.identity == identity && !session.task.is_finished() {
                session.handle.ensure_subscribed();
                return session.handle.clone();
            }
        }

        self.stop_session();
        self.spawn_session(identity)
    }

    /// Handle of the running session, if any
    pub fn handle(&self) -> Option<RealtimeHandle> {
        self.session.as_ref().map(|s| s.handle.clone())
    }

    pub fn identity(&self) -> Option<&UserId> {
        self.session.as_ref().map(|s| &s.identity)
    }

    /// Stop the session and wait until its channel is released
    pub async fn dispose(&mut self) {
        if let Some(session) = self.session.take() {
            session.handle.send(Command::Dispose);
            if let Err(e) = session.task.await {
                tracing::warn!(error = %e, "Realtime session task ended abnormally");
            }
        }
    }

    fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(user_id = %session.identity, "Stopping realtime session");
            session.handle.send(Command::Dispose);
        }
    }

    fn spawn_session(&mut self, identity: UserId) -> RealtimeHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);

        let router = EventRouter::new(
            identity.clone(),
            self.handlers.clone(),
            self.presenters.clone(),
            self.presentation.clone(),
        );
        let supervisor = ReconnectSupervisor::new(
            self.realtime.max_retries,
            RetryBackoff::with_config(self.realtime.backoff()),
        );

        let task = SessionTask {
            transport: self.transport.clone(),
            spec: ChannelSpec::chat(self.realtime.channel.clone()),
            router,
            supervisor,
            liveness_resets_retries: self.realtime.liveness_resets_retries,
            channel: None,
            retry: None,
            connected: connected_tx,
            event_tx,
            event_rx,
            commands: command_rx,
            counters: EventCounters::default(),
            last_connected_at: None,
        };

        let span = tracing::info_span!("realtime_session", user_id = %identity);
        let join = tokio::spawn(task.run().instrument(span));

        let handle = RealtimeHandle {
            commands: Some(command_tx),
            connected: connected_rx,
        };

        tracing::info!(
            user_id = %identity,
            transport = self.transport.name(),
            "Realtime session started"
        );

        self.session = Some(ActiveSession {
            identity,
            handle: handle.clone(),
            task: join,
        });

        handle
    }
}

impl Drop for RealtimeManager {
    fn drop(&mut self) {
        self.stop_session();
    }
}

struct PendingRetry {
    deadline: Instant,
    delay: Duration,
}

#[derive(Default)]
struct EventCounters {
    dispatched: u64,
    suppressed: u64,
    stale: u64,
}

/// State owned by the session task
struct SessionTask {
    transport: Arc<dyn Transport>,
    spec: ChannelSpec,
    router: EventRouter,
    supervisor: ReconnectSupervisor,
    liveness_resets_retries: bool,
    channel: Option<ChannelHandle>,
    retry: Option<PendingRetry>,
    connected: watch::Sender<bool>,
    event_tx: EventSink,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    counters: EventCounters,
    last_connected_at: Option<DateTime<Utc>>,
}

impl SessionTask {
    async fn run(mut self) {
        self.setup().await;

        loop {
            let retry_deadline = self.retry.as_ref().map(|r| r.deadline);

            tokio::select! {
                biased;

                // Transport events first so a command never overtakes an
                // event that was already emitted
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event).await;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Dispose) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
                _ = wait_for(retry_deadline) => {
                    self.retry_due().await;
                }
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Setup => self.setup().await,
            Command::Reconnect => self.reconnect().await,
            Command::Signal(EnvironmentSignal::ManualReconnect) => {
                SessionMetrics::record_external_trigger(EnvironmentSignal::ManualReconnect.as_str());
                self.reconnect().await;
            }
            Command::Signal(signal) => self.resume(signal).await,
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the run loop
            Command::Dispose => {}
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        let current = self.channel.as_ref().map(|c| c.id());
        if current != Some(event.channel) {
            self.counters.stale += 1;
            EventMetrics::record_stale();
            tracing::debug!(channel_id = %event.channel, "Dropping event from a channel that is no longer current");
            return;
        }

        match event.kind {
            TransportEventKind::Status(SubscriptionStatus::Subscribed) => {
                if self.supervisor.on_subscribed() {
                    self.last_connected_at = Some(Utc::now());
                    self.set_connected(true);
                    tracing::info!(
                        channel_id = %event.channel,
                        channel = %self.spec.name,
                        "Realtime channel subscribed"
                    );
                }
            }
            TransportEventKind::Status(status) => {
                tracing::warn!(
                    channel_id = %event.channel,
                    status = status.as_str(),
                    retry_count = self.supervisor.retry_count(),
                    "Realtime channel failed"
                );
                self.on_failure(status.as_str()).await;
            }
            TransportEventKind::Broadcast(envelope) => {
                let outcome = self.router.route_broadcast(&envelope);
                self.record_outcome(outcome);
            }
            TransportEventKind::RowChange(change) => {
                let outcome = self.router.route_change(&change);
                self.record_outcome(outcome);
            }
        }
    }

    fn record_outcome(&mut self, outcome: RouteOutcome) {
        match outcome {
            RouteOutcome::Delivered { liveness } => {
                self.counters.dispatched += 1;
                if liveness && self.liveness_resets_retries {
                    self.supervisor.reset_retries();
                }
            }
            RouteOutcome::Suppressed => self.counters.suppressed += 1,
            RouteOutcome::Ignored => {}
        }
    }

    /// Create a channel if the supervisor allows it
    async fn setup(&mut self) {
        if self.channel.is_some() {
            tracing::debug!("Channel already active, skipping setup");
            return;
        }
        if !self.supervisor.begin_subscribe() {
            tracing::debug!(state = %self.supervisor.state(), "Setup not allowed in current state");
            return;
        }

        SessionMetrics::record_subscribe_attempt();

        match self
            .transport
            .subscribe(self.spec.clone(), self.event_tx.clone())
            .await
        {
            Ok(handle) => {
                tracing::debug!(channel_id = %handle.id(), channel = %handle.name(), "Channel created");
                self.channel = Some(handle);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create realtime channel");
                self.on_failure("SETUP_ERROR").await;
            }
        }
    }

    async fn on_failure(&mut self, reason: &str) {
        self.set_connected(false);

        match self.supervisor.on_failure() {
            FailureAction::Retry { attempt, delay } => {
                SessionMetrics::record_failure(reason);
                SessionMetrics::record_retry_scheduled(delay);
                tracing::info!(
                    attempt = attempt + 1,
                    max_retries = self.supervisor.max_retries(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling realtime resubscription"
                );
                self.retry = Some(PendingRetry {
                    deadline: Instant::now() + delay,
                    delay,
                });
            }
            FailureAction::Degrade => {
                SessionMetrics::record_failure(reason);
                SessionMetrics::record_degraded();
                tracing::warn!(
                    max_retries = self.supervisor.max_retries(),
                    "Realtime retries exhausted, falling back to polling until an external trigger"
                );
                self.release_channel().await;
            }
            FailureAction::Ignore => {
                tracing::debug!(
                    state = %self.supervisor.state(),
                    reason,
                    "Failure already handled"
                );
            }
        }
    }

    async fn retry_due(&mut self) {
        self.retry = None;
        if !self.supervisor.on_retry_due() {
            return;
        }

        tracing::debug!(retry_count = self.supervisor.retry_count(), "Retry timer fired");
        self.release_channel().await;
        self.setup().await;
    }

    async fn reconnect(&mut self) {
        if self.supervisor.state() == ConnectionState::Disposed {
            return;
        }

        tracing::info!(state = %self.supervisor.state(), "Manual reconnect");
        self.retry = None;
        self.supervisor.reset_retries();
        self.release_channel().await;
        self.supervisor.on_released();
        self.set_connected(false);
        self.setup().await;
    }

    async fn resume(&mut self, signal: EnvironmentSignal) {
        SessionMetrics::record_external_trigger(signal.as_str());

        if !self.supervisor.resume() {
            tracing::debug!(
                signal = signal.as_str(),
                state = %self.supervisor.state(),
                "Channel healthy, ignoring environment signal"
            );
            return;
        }

        tracing::info!(signal = signal.as_str(), "Resuming realtime subscription");
        self.retry = None;
        self.release_channel().await;
        self.setup().await;
    }

    /// Remove the current channel; failures are logged and swallowed
    async fn release_channel(&mut self) {
        let Some(handle) = self.channel.take() else {
            return;
        };

        let id = handle.id();
        if let Err(e) = self.transport.remove_channel(handle).await {
            SessionMetrics::record_cleanup_failure();
            tracing::warn!(channel_id = %id, error = %e, "Failed to remove realtime channel");
        }
    }

    async fn teardown(&mut self) {
        self.retry = None;
        self.release_channel().await;
        self.supervisor.dispose();
        self.set_connected(false);
        tracing::info!("Realtime session disposed");
    }

    fn set_connected(&mut self, connected: bool) {
        let changed = self.connected.send_if_modified(|current| {
            if *current == connected {
                return false;
            }
            *current = connected;
            true
        });
        if changed {
            SessionMetrics::record_connected_changed(connected);
        }
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            user_id: self.router.identity().clone(),
            transport: self.transport.name(),
            state: self.supervisor.state(),
            connected: *self.connected.borrow(),
            retry_count: self.supervisor.retry_count(),
            max_retries: self.supervisor.max_retries(),
            pending_retry_ms: self.retry.as_ref().map(|r| r.delay.as_millis() as u64),
            channel_id: self.channel.as_ref().map(|c| c.id()),
            stats: self.supervisor.stats(),
            events_dispatched: self.counters.dispatched,
            events_suppressed: self.counters.suppressed,
            stale_events: self.counters.stale,
            last_connected_at: self.last_connected_at,
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
