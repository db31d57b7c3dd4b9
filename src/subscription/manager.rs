use std::sync::Arc;

use crate::notification::NotificationDispatcher;
use crate::stomp::Subscriptions;

use super::channels::{channels_for, ChannelSubscription, Role};

/// Registers the role-dependent channel set on every (re)connect
pub struct SubscriptionManager {
    username: String,
    role: Option<Role>,
    channels: Vec<ChannelSubscription>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl SubscriptionManager {
    pub fn new(
        username: impl Into<String>,
        role: Option<Role>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let username = username.into();
        let channels = channels_for(&username, role);
        Self {
            username,
            role,
            channels,
            dispatcher,
        }
    }

    pub fn channels(&self) -> &[ChannelSubscription] {
        &self.channels
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Request one subscription per channel, each with its own handler
    pub fn register(&self, subscriptions: &mut Subscriptions) {
        for channel in &self.channels {
            let dispatcher = self.dispatcher.clone();
            let destination = channel.destination.clone();
            let rule = channel.rule.clone();

            subscriptions.subscribe(channel.destination.clone(), move |frame| {
                dispatcher.dispatch(&destination, &frame.body, &rule);
            });
        }

        tracing::info!(
            username = %self.username,
            role = ?self.role,
            channels = self.channels.len(),
            "Registering notification channels"
        );
    }
}
