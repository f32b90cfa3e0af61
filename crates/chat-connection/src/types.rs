//! Public types for the chat connection manager.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rentchat_protocol::constants::{
    DEFAULT_HEARTBEAT_INCOMING, DEFAULT_HEARTBEAT_OUTGOING, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_BASE_DELAY, DEFAULT_RECONNECT_MAX_DELAY,
};

use crate::config::duration_ms;
use crate::error::ConnectError;

/// Connection state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session. A reconnect may be pending.
    Disconnected,
    /// Transport negotiation or STOMP handshake in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Gave up. Only `disconnect()` leaves this state.
    Disabled,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The manager moved to a new state.
    StateChanged(ConnectionState),
    /// A reconnect attempt was scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// An error was reported to the `on_error` callback.
    Failed(ConnectError),
}

/// Invoked once per successful session.
pub type OnConnected = Arc<dyn Fn() + Send + Sync>;

/// Invoked for every reported failure.
pub type OnError = Arc<dyn Fn(&ConnectError) + Send + Sync>;

/// Invoked with each well-formed JSON payload delivered to a subscription.
pub type OnMessage = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Reconnect policy with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Retries allowed after a failure before the manager disables itself.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Backoff ceiling.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based):
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Heart-beat intervals offered in the CONNECT frame. Zero disables a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    #[serde(rename = "outgoing_ms", with = "duration_ms")]
    pub outgoing: Duration,
    #[serde(rename = "incoming_ms", with = "duration_ms")]
    pub incoming: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            outgoing: DEFAULT_HEARTBEAT_OUTGOING,
            incoming: DEFAULT_HEARTBEAT_INCOMING,
        }
    }
}

impl HeartbeatConfig {
    /// Both directions off.
    pub fn disabled() -> Self {
        Self {
            outgoing: Duration::ZERO,
            incoming: Duration::ZERO,
        }
    }

    /// Value of the `heart-beat` header: `<outgoing ms>,<incoming ms>`.
    pub fn header_value(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }
}
