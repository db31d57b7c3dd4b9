use crate::error::Result;
use crate::notification::NotificationHandler;

use super::{NotificationService, NotificationSession};

/// Caller-owned holder for at most one notification session
pub struct NotificationClient {
    service: NotificationService,
    session: Option<NotificationSession>,
}

impl NotificationClient {
    pub fn new(service: NotificationService) -> Self {
        Self {
            service,
            session: None,
        }
    }

    /// Start a new session, replacing (and disconnecting) any current one.
    ///
    /// On error the current session, if any, is left untouched.
    pub fn connect<H>(&mut self, username: &str, handler: H, token: &str) -> Result<()>
    where
        H: NotificationHandler + 'static,
    {
        let session = self.service.connect(username, handler, token)?;

        if let Some(previous) = self.session.replace(session) {
            tracing::warn!(
                session_id = %previous.id(),
                "connect called with an active session, disconnecting the previous one"
            );
            previous.disconnect();
        }
        Ok(())
    }

    /// Disconnect the current session. No-op when there is none.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.disconnect();
        }
    }

    pub fn session(&self) -> Option<&NotificationSession> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }
}
