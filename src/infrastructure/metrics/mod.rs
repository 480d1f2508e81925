//! Prometheus metrics for the realtime manager.
//!
//! - Session metrics (connected sessions, subscribe attempts, degradations)
//! - Retry metrics (scheduled retries, backoff delays)
//! - Event metrics (received by category, suppressed, handler dispatches)
//! - Transport cleanup failures
//! - Presentation gauges, refreshed on scrape

mod helpers;

pub use helpers::{encode_metrics, EventMetrics, SessionMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "chat_realtime";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Sessions currently holding an acknowledged subscription
    pub static ref SESSIONS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_sessions_connected", METRIC_PREFIX),
        "Number of sessions with an acknowledged subscription"
    ).unwrap();

    /// Total channel setup attempts
    pub static ref SUBSCRIBE_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_subscribe_attempts_total", METRIC_PREFIX),
        "Total channel setup attempts"
    ).unwrap();

    /// Total transitions into degraded mode
    pub static ref DEGRADED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_degraded_total", METRIC_PREFIX),
        "Total sessions that exhausted automatic retries"
    ).unwrap();

    /// Total channel failures by reported status
    pub static ref CHANNEL_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_failures_total", METRIC_PREFIX),
        "Total channel failures by status",
        &["status"]
    ).unwrap();

    /// Total failed channel removals
    pub static ref CLEANUP_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_cleanup_failures_total", METRIC_PREFIX),
        "Total failed channel removals"
    ).unwrap();

    // ============================================================================
    // Retry Metrics
    // ============================================================================

    /// Total retries scheduled
    pub static ref RETRIES_SCHEDULED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_retries_scheduled_total", METRIC_PREFIX),
        "Total resubscription retries scheduled"
    ).unwrap();

    /// Scheduled retry delay
    pub static ref RETRY_DELAY_SECONDS: Histogram = register_histogram!(
        format!("{}_retry_delay_seconds", METRIC_PREFIX),
        "Scheduled resubscription delay in seconds",
        vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 61.0]
    ).unwrap();

    /// Resubscriptions requested from outside (visibility, online, manual)
    pub static ref EXTERNAL_TRIGGERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_external_triggers_total", METRIC_PREFIX),
        "Total external reconnect triggers by source",
        &["source"]
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Events received from the transport by category
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Total events received by category",
        &["category"]
    ).unwrap();

    /// Self-originated broadcasts dropped
    pub static ref EVENTS_SUPPRESSED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_suppressed_total", METRIC_PREFIX),
        "Total self-originated broadcasts suppressed"
    ).unwrap();

    /// Events from channels that are no longer current
    pub static ref EVENTS_STALE_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_stale_total", METRIC_PREFIX),
        "Total events dropped because their channel was already released"
    ).unwrap();

    /// Handler invocations by handler
    pub static ref HANDLER_DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_handler_dispatch_total", METRIC_PREFIX),
        "Total handler invocations",
        &["handler"]
    ).unwrap();

    // ============================================================================
    // Presentation Metrics
    // ============================================================================

    /// Desktop notifications currently shown
    pub static ref NOTIFICATIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_notifications_active", METRIC_PREFIX),
        "Number of desktop notifications currently shown"
    ).unwrap();

    /// Seconds since the last acknowledged subscription
    pub static ref LAST_CONNECTED_AGE_SECONDS: IntGauge = register_int_gauge!(
        format!("{}_last_connected_age_seconds", METRIC_PREFIX),
        "Seconds since the session last became connected, -1 if never"
    ).unwrap();
}
