//! Prometheus metrics for the notification client.
//!
//! - Session metrics (active sessions, connection state changes, reconnects)
//! - STOMP frame metrics (frames received by command, heartbeat timeouts, ERROR frames)
//! - Notification metrics (dispatched by type, payload fallbacks)

mod helpers;

pub use helpers::{encode_metrics, NotificationMetrics, SessionMetrics, StompMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "uni_earn";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Number of notification sessions that are currently connected
    pub static ref SESSIONS_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_sessions_connected", METRIC_PREFIX),
        "Number of notification sessions with an established STOMP connection"
    ).unwrap();

    /// Total connection state transitions by target state
    pub static ref SESSION_STATE_CHANGES: IntCounterVec = register_int_counter_vec!(
        format!("{}_session_state_changes_total", METRIC_PREFIX),
        "Total connection state transitions",
        &["state"]
    ).unwrap();

    /// Total reconnect attempts scheduled
    pub static ref RECONNECT_ATTEMPTS: IntCounter = register_int_counter!(
        format!("{}_reconnect_attempts_total", METRIC_PREFIX),
        "Total reconnect attempts scheduled after a lost connection"
    ).unwrap();

    /// Total subscriptions sent to the broker
    pub static ref SUBSCRIPTIONS_REGISTERED: IntCounter = register_int_counter!(
        format!("{}_subscriptions_registered_total", METRIC_PREFIX),
        "Total SUBSCRIBE frames sent to the broker"
    ).unwrap();

    // ============================================================================
    // STOMP Frame Metrics
    // ============================================================================

    /// Frames received from the broker by command
    pub static ref FRAMES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_stomp_frames_received_total", METRIC_PREFIX),
        "Total STOMP frames received",
        &["command"]
    ).unwrap();

    /// Inbound messages that could not be decoded as STOMP frames
    pub static ref FRAME_DECODE_ERRORS: IntCounter = register_int_counter!(
        format!("{}_stomp_frame_decode_errors_total", METRIC_PREFIX),
        "Total inbound messages that failed STOMP decoding"
    ).unwrap();

    /// ERROR frames received
    pub static ref STOMP_ERRORS: IntCounter = register_int_counter!(
        format!("{}_stomp_errors_total", METRIC_PREFIX),
        "Total ERROR frames received from the broker"
    ).unwrap();

    /// Connections dropped because the broker stopped sending heartbeats
    pub static ref HEARTBEAT_TIMEOUTS: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total connections closed due to missing broker heartbeats"
    ).unwrap();

    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notifications handed to the application by type
    pub static ref NOTIFICATIONS_DISPATCHED: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_dispatched_total", METRIC_PREFIX),
        "Total notifications dispatched to the application",
        &["type"]
    ).unwrap();

    /// Bodies that were not JSON objects and were wrapped as plain messages
    pub static ref PAYLOAD_FALLBACKS: IntCounter = register_int_counter!(
        format!("{}_payload_fallbacks_total", METRIC_PREFIX),
        "Total notification bodies delivered through the plain-text fallback"
    ).unwrap();
}
