//! Message transports underneath the STOMP session.
//!
//! A fresh [`Transport`] is opened by a [`Connector`] for every connection
//! attempt. [`WebSocketConnector`] talks to the real broker;
//! [`ChannelConnector`] wires the session to an in-process peer.

use std::sync::Once;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{AppError, Result};

use super::frame::{Frame, HEARTBEAT};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

static CRYPTO_PROVIDER: Once = Once::new();

/// `wss://` handshakes need a process-level rustls provider
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("rustls crypto provider already installed");
        }
    });
}

/// A bidirectional text-message channel to the broker
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound text message; `None` once the peer has closed
    async fn next_text(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// Opens a new transport for each connection attempt
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// Connector for `ws://` and `wss://` endpoints
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        install_crypto_provider();
        let (ws, response) = connect_async(url).await?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake completed");
        Ok(Box::new(WebSocketTransport { ws }))
    }
}

struct WebSocketTransport {
    ws: WsStream,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            let msg = match self.ws.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.as_str().to_owned())),
                Message::Binary(data) => {
                    return Some(String::from_utf8(data.to_vec()).map_err(|e| {
                        AppError::Protocol(format!("Binary frame is not UTF-8: {}", e))
                    }))
                }
                Message::Close(frame) => {
                    tracing::debug!(close_frame = ?frame, "WebSocket closed by peer");
                    return None;
                }
                // Pings are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}

// ============================================================================
// In-process transport
// ============================================================================

/// Connector that hands the broker side of every connection to a receiver
/// instead of opening a socket
pub struct ChannelConnector {
    accept_tx: mpsc::UnboundedSender<PeerConnection>,
}

impl ChannelConnector {
    /// Create a connector and the receiver on which accepted connections arrive
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeerConnection>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Self { accept_tx }, accept_rx)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        let peer = PeerConnection {
            url: url.to_string(),
            inbound: server_rx,
            outbound: server_tx,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| AppError::Transport(format!("Connection refused: {}", url)))?;

        Ok(Box::new(ChannelTransport {
            tx: client_tx,
            rx: client_rx,
        }))
    }
}

struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.tx
            .send(text)
            .map_err(|_| AppError::Transport("Peer has gone away".to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// Broker side of an in-process connection
pub struct PeerConnection {
    pub url: String,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl PeerConnection {
    /// Next frame sent by the client, skipping heartbeats.
    /// `None` once the client has dropped its end.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            let text = self.inbound.recv().await?;
            if text == HEARTBEAT {
                continue;
            }
            match Frame::parse_all(&text) {
                Ok(mut frames) if !frames.is_empty() => return Some(frames.remove(0)),
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Peer received undecodable frame");
                    continue;
                }
            }
        }
    }

    /// Next raw message sent by the client, heartbeats included
    pub async fn recv_text(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.send_text(frame.to_wire())
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.outbound
            .send(text.into())
            .map_err(|_| AppError::Transport("Client has gone away".to_string()))
    }
}
