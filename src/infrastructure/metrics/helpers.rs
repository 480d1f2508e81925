//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    CHANNEL_FAILURES_TOTAL, CLEANUP_FAILURES_TOTAL, DEGRADED_TOTAL, EVENTS_RECEIVED_TOTAL,
    EVENTS_STALE_TOTAL, EVENTS_SUPPRESSED_TOTAL, EXTERNAL_TRIGGERS_TOTAL, HANDLER_DISPATCH_TOTAL,
    RETRIES_SCHEDULED_TOTAL, RETRY_DELAY_SECONDS, SESSIONS_CONNECTED, SUBSCRIBE_ATTEMPTS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording session lifecycle metrics
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_subscribe_attempt() {
        SUBSCRIBE_ATTEMPTS_TOTAL.inc();
    }

    /// Record a change of the connected flag
    pub fn record_connected_changed(connected: bool) {
        if connected {
            SESSIONS_CONNECTED.inc();
        } else {
            SESSIONS_CONNECTED.dec();
        }
    }

    pub fn record_failure(status: &str) {
        CHANNEL_FAILURES_TOTAL.with_label_values(&[status]).inc();
    }

    pub fn record_retry_scheduled(delay: Duration) {
        RETRIES_SCHEDULED_TOTAL.inc();
        RETRY_DELAY_SECONDS.observe(delay.as_secs_f64());
    }

    pub fn record_degraded() {
        DEGRADED_TOTAL.inc();
    }

    pub fn record_external_trigger(source: &str) {
        EXTERNAL_TRIGGERS_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn record_cleanup_failure() {
        CLEANUP_FAILURES_TOTAL.inc();
    }
}

/// Helper struct for recording event routing metrics
pub struct EventMetrics;

impl EventMetrics {
    pub fn record_received(category: &str) {
        EVENTS_RECEIVED_TOTAL.with_label_values(&[category]).inc();
    }

    pub fn record_suppressed() {
        EVENTS_SUPPRESSED_TOTAL.inc();
    }

    pub fn record_stale() {
        EVENTS_STALE_TOTAL.inc();
    }

    pub fn record_conversation_dispatch() {
        HANDLER_DISPATCH_TOTAL
            .with_label_values(&["conversation"])
            .inc();
    }

    pub fn record_message_dispatch() {
        HANDLER_DISPATCH_TOTAL.with_label_values(&["message"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        EventMetrics::record_received("broadcast");
        SessionMetrics::record_subscribe_attempt();

        let output = encode_metrics().unwrap();
        assert!(output.contains("chat_realtime_events_received_total"));
        assert!(output.contains("chat_realtime_subscribe_attempts_total"));
    }
}
