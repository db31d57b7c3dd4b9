//! STOMP 1.2 client over WebSocket.
//!
//! - `frame`: wire codec and heartbeat negotiation
//! - `transport`: WebSocket and in-process transports
//! - `backoff`: reconnect delay policy
//! - `client`: session lifecycle (handshake, heartbeats, subscriptions, reconnects)

mod backoff;
mod client;
pub mod frame;
pub mod transport;

pub use backoff::{ReconnectBackoff, ReconnectPolicy};
pub use client::{
    ConnectCallback, ConnectionState, MessageCallback, StompClient, StompClientConfig,
    Subscriptions,
};
pub use frame::{Command, Frame};
pub use transport::{ChannelConnector, Connector, PeerConnection, Transport, WebSocketConnector};
