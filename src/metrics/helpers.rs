//! Metric recording helpers

use prometheus::{Encoder, TextEncoder};

use super::*;

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for session lifecycle metrics
pub struct SessionMetrics;

impl SessionMetrics {
    /// Record a connection state transition
    pub fn record_state(state: &str) {
        SESSION_STATE_CHANGES.with_label_values(&[state]).inc();
    }

    pub fn record_connected() {
        SESSIONS_CONNECTED.inc();
    }

    pub fn record_disconnected() {
        SESSIONS_CONNECTED.dec();
    }

    pub fn record_reconnect_attempt() {
        RECONNECT_ATTEMPTS.inc();
    }

    pub fn record_subscriptions(count: usize) {
        SUBSCRIPTIONS_REGISTERED.inc_by(count as u64);
    }
}

/// Helper struct for STOMP frame metrics
pub struct StompMetrics;

impl StompMetrics {
    pub fn record_frame(command: &str) {
        FRAMES_RECEIVED.with_label_values(&[command]).inc();
    }

    pub fn record_decode_error() {
        FRAME_DECODE_ERRORS.inc();
    }

    pub fn record_error_frame() {
        STOMP_ERRORS.inc();
    }

    pub fn record_heartbeat_timeout() {
        HEARTBEAT_TIMEOUTS.inc();
    }
}

/// Helper struct for notification metrics
pub struct NotificationMetrics;

impl NotificationMetrics {
    pub fn record_dispatched(kind: &str) {
        NOTIFICATIONS_DISPATCHED.with_label_values(&[kind]).inc();
    }

    pub fn record_fallback() {
        PAYLOAD_FALLBACKS.inc();
    }
}
