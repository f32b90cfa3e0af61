//! Chat connection manager for the rentchat broker.
//!
//! Provides a reconnecting STOMP-over-WebSocket client with bounded
//! exponential backoff, subscription bookkeeping and a pluggable transport.

pub mod auth;
pub mod config;
pub mod error;
pub mod manager;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub(crate) mod session;
pub mod subscriptions;
pub mod transport;
pub mod types;
pub mod ws_transport;

pub use auth::TokenProvider;
pub use config::{ConfigError, ConnectionConfig, Endpoint};
pub use error::{ConnectError, FailureClass, TransportError};
pub use manager::{ConnectionManager, WeakConnectionManager};
pub use subscriptions::Subscription;
pub use transport::{Link, LinkEvent, LinkPeer, TransportFactory};
pub use types::{
    ConnectionEvent, ConnectionState, HeartbeatConfig, OnConnected, OnError, OnMessage,
    ReconnectConfig,
};
pub use ws_transport::WsTransport;
