//! Public entry points of the notification subsystem.
//!
//! [`NotificationService::connect`] decodes the caller's token, builds a STOMP
//! client with the role-dependent subscription set, and starts it in the
//! background. The returned [`NotificationSession`] is the only handle to that
//! connection; [`NotificationClient`] keeps at most one session at a time.

mod client;
mod session;

pub use client::NotificationClient;
pub use session::NotificationSession;

use std::sync::Arc;

use crate::auth::TokenReader;
use crate::config::StompConfig;
use crate::error::{AppError, Result};
use crate::notification::{NotificationDispatcher, NotificationHandler};
use crate::stomp::{Connector, StompClient, StompClientConfig, WebSocketConnector};
use crate::subscription::{Role, SubscriptionManager};

/// Factory for notification sessions against one broker endpoint
pub struct NotificationService {
    config: StompConfig,
    connector: Arc<dyn Connector>,
    token_reader: TokenReader,
}

impl NotificationService {
    /// Service connecting over WebSocket to `config.url`
    pub fn new(config: StompConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    pub fn with_connector(config: StompConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            token_reader: TokenReader::new(),
        }
    }

    pub fn config(&self) -> &StompConfig {
        &self.config
    }

    /// Start a notification session for `username`.
    ///
    /// Returns as soon as the connection attempt is scheduled; the handshake,
    /// subscriptions and reconnects happen on a background task. Only token
    /// and argument problems are reported here, everything later is logged
    /// and visible through [`NotificationSession::watch_state`].
    ///
    /// Must be called from within a tokio runtime.
    #[tracing::instrument(
        name = "notifications.connect",
        skip(self, handler, token),
        fields(username = %username)
    )]
    pub fn connect<H>(&self, username: &str, handler: H, token: &str) -> Result<NotificationSession>
    where
        H: NotificationHandler + 'static,
    {
        if username.is_empty() {
            return Err(AppError::Validation("username must not be empty".to_string()));
        }
        if token.is_empty() {
            return Err(AppError::Validation("token must not be empty".to_string()));
        }

        let role_claim = match self.token_reader.read_role(token) {
            Ok(role) => role,
            Err(e) => {
                tracing::error!(error = %e, "Failed to decode bearer token, not connecting");
                return Err(e);
            }
        };
        let role = Role::from_claim(&role_claim);
        if role.is_none() && !role_claim.is_empty() {
            tracing::warn!(role = %role_claim, "Unrecognized role claim, subscribing to common channels only");
        }

        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(handler)));
        let manager = Arc::new(SubscriptionManager::new(username, role, dispatcher.clone()));

        let client_config = StompClientConfig::from_config(&self.config)
            .with_header("Authorization", format!("Bearer {}", token));
        let registrar = manager.clone();
        let mut client = StompClient::new(client_config, self.connector.clone(), move |_, subscriptions| {
            registrar.register(subscriptions);
        });
        client.activate();

        tracing::info!(
            session_id = %client.id(),
            role = ?role,
            url = %self.config.url,
            "Notification session started"
        );

        Ok(NotificationSession::new(
            username.to_string(),
            client,
            manager,
            dispatcher,
        ))
    }
}
