//! Reconnection state machine.
//!
//! `ReconnectSupervisor` holds no I/O: it decides, for every lifecycle input,
//! what the connection state becomes and whether a retry should be scheduled.
//! The manager task feeds it and carries out the resulting actions.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::backoff::RetryBackoff;

/// Lifecycle state of a realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel and nothing in flight
    Idle,
    /// Setup issued, waiting for the transport acknowledgment
    Subscribing,
    /// Acknowledged and delivering events
    Subscribed,
    /// Channel failed, retry timer pending
    RetryWait,
    /// Automatic retries exhausted; only an external trigger resumes
    Degraded,
    /// Torn down for good
    Disposed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::RetryWait => "retry_wait",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Disposed => "disposed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the manager must do after a channel failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Tear down and resubscribe after `delay`; `attempt` is 0-indexed
    Retry { attempt: u32, delay: Duration },
    /// Stop retrying automatically
    Degrade,
    /// Failure already being handled (or no channel to fail)
    Ignore,
}

/// Counters kept across the supervisor's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    pub subscribe_attempts: u64,
    pub failures: u64,
    pub reconnections: u64,
}

pub struct ReconnectSupervisor {
    state: ConnectionState,
    retry_count: u32,
    max_retries: u32,
    backoff: RetryBackoff,
    ever_subscribed: bool,
    stats: SupervisorStats,
}

impl ReconnectSupervisor {
    pub fn new(max_retries: u32, backoff: RetryBackoff) -> Self {
        Self {
            state: ConnectionState::Idle,
            retry_count: 0,
            max_retries,
            backoff,
            ever_subscribed: false,
            stats: SupervisorStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Subscribed
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    /// Enter `Subscribing`. Only an idle supervisor may start a setup, so a
    /// request arriving while a channel is in flight, established, waiting
    /// for its retry timer or degraded is a no-op.
    pub fn begin_subscribe(&mut self) -> bool {
        if self.state != ConnectionState::Idle {
            return false;
        }
        self.state = ConnectionState::Subscribing;
        self.stats.subscribe_attempts += 1;
        true
    }

    /// Retry timer expired
    pub fn on_retry_due(&mut self) -> bool {
        if self.state != ConnectionState::RetryWait {
            return false;
        }
        self.state = ConnectionState::Idle;
        true
    }

    /// External trigger (visibility, network online). Resets the counter and
    /// returns whether a new setup should follow; a connected or connecting
    /// channel is left alone.
    pub fn resume(&mut self) -> bool {
        match self.state {
            ConnectionState::Idle | ConnectionState::RetryWait | ConnectionState::Degraded => {
                self.retry_count = 0;
                self.state = ConnectionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Transport acknowledged the subscription
    pub fn on_subscribed(&mut self) -> bool {
        if self.state != ConnectionState::Subscribing {
            return false;
        }

        if self.ever_subscribed {
            self.stats.reconnections += 1;
        }
        self.ever_subscribed = true;
        self.state = ConnectionState::Subscribed;
        self.retry_count = 0;
        true
    }

    /// Channel reported an error, timed out, closed, or could not be created
    pub fn on_failure(&mut self) -> FailureAction {
        match self.state {
            ConnectionState::Subscribing | ConnectionState::Subscribed => {}
            _ => return FailureAction::Ignore,
        }

        self.stats.failures += 1;

        if self.retry_count >= self.max_retries {
            self.state = ConnectionState::Degraded;
            return FailureAction::Degrade;
        }

        let attempt = self.retry_count;
        let delay = self.backoff.delay_for(attempt);
        self.retry_count += 1;
        self.state = ConnectionState::RetryWait;

        FailureAction::Retry { attempt, delay }
    }

    /// Channel was released on request (manual reconnect)
    pub fn on_released(&mut self) {
        if self.state != ConnectionState::Disposed {
            self.state = ConnectionState::Idle;
        }
    }

    /// Forget past failures so the next one backs off from attempt 0
    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    pub fn dispose(&mut self) {
        self.state = ConnectionState::Disposed;
    }
}
