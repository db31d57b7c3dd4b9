use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::metrics::NotificationMetrics;

use super::normalizer::{normalize_payload, Payload};
use super::types::{Notification, NotificationType, TypeRule};

/// Application callback receiving every normalized notification.
///
/// Called on the session task, once per inbound frame, in delivery order for
/// each channel. Implementations must not block or panic; panics are not
/// caught and take the session down.
pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, notification: Notification, kind: NotificationType);
}

impl<F> NotificationHandler for F
where
    F: Fn(Notification, NotificationType) + Send + Sync,
{
    fn on_notification(&self, notification: Notification, kind: NotificationType) {
        self(notification, kind)
    }
}

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total notifications handed to the application
    pub total_dispatched: AtomicU64,
    /// Bodies delivered through the plain-text fallback
    pub fallbacks: AtomicU64,
    /// Notifications delivered on forced-type channels
    pub forced: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            forced: self.forced.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_dispatched: u64,
    pub fallbacks: u64,
    pub forced: u64,
}

/// Normalizes frame bodies and forwards them to the application handler
pub struct NotificationDispatcher {
    handler: Arc<dyn NotificationHandler>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(handler: Arc<dyn NotificationHandler>) -> Self {
        Self {
            handler,
            stats: DispatcherStats::default(),
        }
    }

    /// Normalize `body` under `rule` and invoke the handler
    pub fn dispatch(&self, destination: &str, body: &str, rule: &TypeRule) {
        let payload = Payload::parse(body);
        if matches!(payload, Payload::Raw(_)) {
            self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        if rule.is_forced() {
            self.stats.forced.fetch_add(1, Ordering::Relaxed);
        }

        let notification = normalize_payload(payload, rule);
        let kind = notification.kind();

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        NotificationMetrics::record_dispatched(kind.as_str());
        tracing::debug!(destination = %destination, notification_type = %kind, "Dispatching notification");

        self.handler.on_notification(notification, kind);
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }
}
