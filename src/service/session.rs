use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::notification::{DispatcherStatsSnapshot, NotificationDispatcher};
use crate::stomp::{ConnectionState, StompClient};
use crate::subscription::{ChannelSubscription, Role, SubscriptionManager};

/// One live (or reconnecting) notification connection.
///
/// Dropping the session disconnects it.
pub struct NotificationSession {
    username: String,
    client: StompClient,
    manager: Arc<SubscriptionManager>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotificationSession {
    pub(crate) fn new(
        username: String,
        client: StompClient,
        manager: Arc<SubscriptionManager>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            username,
            client,
            manager,
            dispatcher,
        }
    }

    pub fn id(&self) -> Uuid {
        self.client.id()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> Option<Role> {
        self.manager.role()
    }

    /// Channels subscribed on every successful connect
    pub fn channels(&self) -> &[ChannelSubscription] {
        self.manager.channels()
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Observe connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.client.watch_state()
    }

    pub fn is_active(&self) -> bool {
        self.client.is_active()
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.dispatcher.stats()
    }

    /// Close the connection and stop reconnecting. Safe to call repeatedly.
    pub fn disconnect(&self) {
        if self.client.is_active() {
            tracing::info!(session_id = %self.id(), username = %self.username, "Disconnecting notification session");
        }
        self.client.deactivate();
    }
}
