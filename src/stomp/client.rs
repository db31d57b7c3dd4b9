use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::tungstenite::http::Uri;
use uuid::Uuid;

use crate::config::StompConfig;
use crate::error::AppError;
use crate::metrics::{SessionMetrics, StompMetrics};

use super::backoff::{ReconnectBackoff, ReconnectPolicy};
use super::frame::{negotiate_heartbeat, Command, Frame, HEARTBEAT};
use super::transport::{Connector, Transport};

/// Period used for heartbeat timers while heartbeats are disabled
const IDLE_TIMER_PERIOD: Duration = Duration::from_secs(3600);

/// Callback invoked for every MESSAGE frame on a subscription
pub type MessageCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Callback invoked after every successful handshake, reconnects included
pub type ConnectCallback = Arc<dyn Fn(&Frame, &mut Subscriptions) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }
}

/// Subscriptions requested for one connection epoch
#[derive(Default)]
pub struct Subscriptions {
    entries: Vec<(String, MessageCallback)>,
}

impl Subscriptions {
    pub fn subscribe<F>(&mut self, destination: impl Into<String>, callback: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.entries.push((destination.into(), Arc::new(callback)));
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(d, _)| d.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StompClientConfig {
    pub url: String,
    /// Virtual host for the CONNECT frame; derived from `url` when unset
    pub host: Option<String>,
    pub connect_headers: Vec<(String, String)>,
    pub reconnect: ReconnectPolicy,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
}

impl StompClientConfig {
    pub fn from_config(config: &StompConfig) -> Self {
        Self {
            url: config.url.clone(),
            host: config.host.clone(),
            connect_headers: Vec::new(),
            reconnect: ReconnectPolicy::from_config(config),
            heartbeat_outgoing: config.heartbeat_outgoing(),
            heartbeat_incoming: config.heartbeat_incoming(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.push((name.into(), value.into()));
        self
    }

    fn virtual_host(&self) -> String {
        if let Some(ref host) = self.host {
            return host.clone();
        }
        self.url
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.host().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// STOMP client that keeps one logical session alive across reconnects.
///
/// All I/O runs on a background task started by [`StompClient::activate`].
/// Dropping the client deactivates it.
pub struct StompClient {
    id: Uuid,
    config: Arc<StompClientConfig>,
    connector: Arc<dyn Connector>,
    on_connect: ConnectCallback,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    active_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl StompClient {
    pub fn new<F>(config: StompClientConfig, connector: Arc<dyn Connector>, on_connect: F) -> Self
    where
        F: Fn(&Frame, &mut Subscriptions) + Send + Sync + 'static,
    {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (active_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            config: Arc::new(config),
            connector,
            on_connect: Arc::new(on_connect),
            state_tx: Arc::new(state_tx),
            active_tx,
            task: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start connecting in the background. Must be called inside a tokio runtime.
    pub fn activate(&mut self) {
        if let Some(ref task) = self.task {
            if !task.is_finished() && self.is_active() {
                return;
            }
        }

        // A previous task that is still winding down keeps the old channel
        let (active_tx, active_rx) = watch::channel(true);
        let previous = std::mem::replace(&mut self.active_tx, active_tx);
        previous.send_replace(false);

        let task = SessionTask {
            client_id: self.id,
            config: self.config.clone(),
            connector: self.connector.clone(),
            on_connect: self.on_connect.clone(),
            state_tx: self.state_tx.clone(),
        };

        tracing::debug!(client_id = %self.id, url = %self.config.url, "Activating STOMP client");
        self.task = Some(tokio::spawn(task.run(active_rx)));
    }

    /// Close the connection and cancel pending reconnects.
    ///
    /// Returns immediately; the transport closes shortly after.
    pub fn deactivate(&self) {
        if self.active_tx.send_replace(false) {
            tracing::debug!(client_id = %self.id, "Deactivating STOMP client");
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active_tx.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

impl Drop for StompClient {
    fn drop(&mut self) {
        self.active_tx.send_replace(false);
    }
}

enum ConnectionOutcome {
    Deactivated,
    Closed,
    Failed(AppError),
}

/// Per-connection protocol state
struct Connection {
    transport: Box<dyn Transport>,
    connected: bool,
    subscriptions: HashMap<String, MessageCallback>,
    heartbeat_outgoing: Duration,
    heartbeat_incoming: Duration,
    outgoing_timer: Interval,
    incoming_timer: Interval,
    last_received: Instant,
}

impl Connection {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            connected: false,
            subscriptions: HashMap::new(),
            heartbeat_outgoing: Duration::ZERO,
            heartbeat_incoming: Duration::ZERO,
            outgoing_timer: idle_timer(),
            incoming_timer: idle_timer(),
            last_received: Instant::now(),
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), AppError> {
        self.transport.send_text(frame.to_wire()).await
    }

    fn start_heartbeats(&mut self, outgoing: Duration, incoming: Duration) {
        self.heartbeat_outgoing = outgoing;
        self.heartbeat_incoming = incoming;
        if !outgoing.is_zero() {
            self.outgoing_timer = interval_at(Instant::now() + outgoing, outgoing);
        }
        if !incoming.is_zero() {
            self.incoming_timer = interval_at(Instant::now() + incoming, incoming);
        }
    }
}

fn idle_timer() -> Interval {
    interval_at(Instant::now() + IDLE_TIMER_PERIOD, IDLE_TIMER_PERIOD)
}

struct SessionTask {
    client_id: Uuid,
    config: Arc<StompClientConfig>,
    connector: Arc<dyn Connector>,
    on_connect: ConnectCallback,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl SessionTask {
    async fn run(self, mut active_rx: watch::Receiver<bool>) {
        let mut backoff = ReconnectBackoff::new(self.config.reconnect.clone());

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.run_connection(&mut active_rx, &mut backoff).await {
                ConnectionOutcome::Deactivated => break,
                ConnectionOutcome::Closed => {
                    tracing::warn!(client_id = %self.client_id, url = %self.config.url, "STOMP connection closed");
                    self.set_state(ConnectionState::Disconnected);
                }
                ConnectionOutcome::Failed(e) => {
                    tracing::error!(
                        client_id = %self.client_id,
                        url = %self.config.url,
                        code = e.code(),
                        error = %e,
                        "STOMP connection failed"
                    );
                    self.set_state(ConnectionState::Errored);
                }
            }

            if !backoff.is_enabled() {
                tracing::info!(client_id = %self.client_id, "Reconnect disabled, stopping STOMP client");
                break;
            }

            let delay = backoff.next_delay();
            SessionMetrics::record_reconnect_attempt();
            tracing::info!(
                client_id = %self.client_id,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to STOMP broker"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = deactivated(&mut active_rx) => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::debug!(client_id = %self.client_id, "STOMP client task stopped");
    }

    async fn run_connection(
        &self,
        active_rx: &mut watch::Receiver<bool>,
        backoff: &mut ReconnectBackoff,
    ) -> ConnectionOutcome {
        let transport = tokio::select! {
            result = self.connector.connect(&self.config.url) => match result {
                Ok(transport) => transport,
                Err(e) => return ConnectionOutcome::Failed(e),
            },
            _ = deactivated(active_rx) => return ConnectionOutcome::Deactivated,
        };
        let mut conn = Connection::new(transport);

        let connect_frame = Frame::connect(
            &self.config.virtual_host(),
            (self.config.heartbeat_outgoing, self.config.heartbeat_incoming),
            &self.config.connect_headers,
        );
        if let Err(e) = conn.send(connect_frame).await {
            conn.transport.close().await;
            return ConnectionOutcome::Failed(e);
        }

        loop {
            tokio::select! {
                _ = deactivated(active_rx) => {
                    if conn.connected {
                        let receipt = format!("close-{}", self.client_id);
                        if let Err(e) = conn.send(Frame::disconnect(&receipt)).await {
                            tracing::debug!(error = %e, "Failed to send DISCONNECT");
                        }
                    }
                    conn.transport.close().await;
                    tracing::info!(client_id = %self.client_id, "STOMP client disconnected");
                    return ConnectionOutcome::Deactivated;
                }
                msg = conn.transport.next_text() => {
                    conn.last_received = Instant::now();
                    let text = match msg {
                        None => return ConnectionOutcome::Closed,
                        Some(Err(e)) => return ConnectionOutcome::Failed(e),
                        Some(Ok(text)) => text,
                    };
                    let frames = match Frame::parse_all(&text) {
                        Ok(frames) => frames,
                        Err(e) => {
                            StompMetrics::record_decode_error();
                            tracing::warn!(client_id = %self.client_id, error = %e, "Discarding undecodable STOMP message");
                            continue;
                        }
                    };
                    for frame in frames {
                        if let Err(e) = self.handle_frame(frame, &mut conn, backoff).await {
                            conn.transport.close().await;
                            return ConnectionOutcome::Failed(e);
                        }
                    }
                }
                _ = conn.outgoing_timer.tick(), if !conn.heartbeat_outgoing.is_zero() => {
                    if let Err(e) = conn.transport.send_text(HEARTBEAT.to_string()).await {
                        return ConnectionOutcome::Failed(e);
                    }
                }
                _ = conn.incoming_timer.tick(), if !conn.heartbeat_incoming.is_zero() => {
                    let silence = conn.last_received.elapsed();
                    if silence > conn.heartbeat_incoming * 2 {
                        StompMetrics::record_heartbeat_timeout();
                        conn.transport.close().await;
                        return ConnectionOutcome::Failed(AppError::Transport(format!(
                            "No heartbeat from broker for {} ms",
                            silence.as_millis()
                        )));
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &self,
        frame: Frame,
        conn: &mut Connection,
        backoff: &mut ReconnectBackoff,
    ) -> Result<(), AppError> {
        StompMetrics::record_frame(frame.command.as_str());

        match frame.command {
            Command::Connected => {
                if conn.connected {
                    tracing::warn!(client_id = %self.client_id, "Ignoring duplicate CONNECTED frame");
                    return Ok(());
                }
                conn.connected = true;
                backoff.reset();

                let (outgoing, incoming) = negotiate_heartbeat(
                    self.config.heartbeat_outgoing,
                    self.config.heartbeat_incoming,
                    frame.get_header("heart-beat"),
                );
                conn.start_heartbeats(outgoing, incoming);

                tracing::info!(
                    client_id = %self.client_id,
                    version = frame.get_header("version").unwrap_or("1.0"),
                    server = frame.get_header("server").unwrap_or("unknown"),
                    heartbeat_outgoing_ms = outgoing.as_millis() as u64,
                    heartbeat_incoming_ms = incoming.as_millis() as u64,
                    "STOMP session established"
                );
                self.set_state(ConnectionState::Connected);

                let mut requested = Subscriptions::default();
                (self.on_connect)(&frame, &mut requested);

                for (index, (destination, callback)) in requested.entries.into_iter().enumerate() {
                    let id = format!("sub-{}", index);
                    conn.send(Frame::subscribe(&id, &destination)).await?;
                    tracing::debug!(client_id = %self.client_id, subscription = %id, destination = %destination, "Subscribed");
                    conn.subscriptions.insert(id, callback);
                }
                SessionMetrics::record_subscriptions(conn.subscriptions.len());
            }
            Command::Message => {
                if !conn.connected {
                    tracing::warn!(client_id = %self.client_id, "MESSAGE frame before CONNECTED, ignoring");
                    return Ok(());
                }
                let callback = frame
                    .get_header("subscription")
                    .and_then(|id| conn.subscriptions.get(id))
                    .cloned();
                match callback {
                    Some(callback) => callback(&frame),
                    None => tracing::debug!(
                        client_id = %self.client_id,
                        subscription = ?frame.get_header("subscription"),
                        "MESSAGE for unknown subscription"
                    ),
                }
            }
            Command::Receipt => {
                tracing::debug!(receipt_id = ?frame.get_header("receipt-id"), "Receipt received");
            }
            Command::Error => {
                StompMetrics::record_error_frame();
                let message = frame.get_header("message").unwrap_or("").to_string();
                tracing::error!(
                    client_id = %self.client_id,
                    message = %message,
                    details = %frame.body,
                    "Broker reported error"
                );
                return Err(AppError::Protocol(format!("Broker error: {}", message)));
            }
            other => {
                tracing::debug!(command = %other, "Ignoring unexpected client frame from broker");
            }
        }

        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous == state {
            return;
        }
        if previous == ConnectionState::Connected {
            SessionMetrics::record_disconnected();
        }
        if state == ConnectionState::Connected {
            SessionMetrics::record_connected();
        }
        SessionMetrics::record_state(state.as_str());
        tracing::debug!(
            client_id = %self.client_id,
            from = previous.as_str(),
            to = state.as_str(),
            "Connection state changed"
        );
    }
}

/// Resolves once the client is deactivated or dropped
async fn deactivated(active_rx: &mut watch::Receiver<bool>) {
    loop {
        if !*active_rx.borrow_and_update() {
            return;
        }
        if active_rx.changed().await.is_err() {
            return;
        }
    }
}
