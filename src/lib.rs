//! Real-time notification client for the Uni Earn marketplace.
//!
//! Opens a STOMP-over-WebSocket session to the marketplace backend,
//! subscribes to the channels that match the user's role, and hands every
//! notification to an application callback.

// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Protocol and domain
pub mod notification;
pub mod stomp;
pub mod subscription;

// Public entry points
pub mod service;

pub use error::{AppError, Result};
pub use notification::{Notification, NotificationHandler, NotificationType};
pub use service::{NotificationClient, NotificationService, NotificationSession};
pub use stomp::ConnectionState;
