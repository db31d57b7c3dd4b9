//! Notification types, normalization, and dispatching.

mod dispatcher;
mod normalizer;
mod types;

pub use dispatcher::{
    DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher, NotificationHandler,
};
pub use normalizer::{normalize, normalize_payload, Payload};
pub use types::{Notification, NotificationType, TypeRule, MESSAGE_FIELD, TYPE_FIELD};
