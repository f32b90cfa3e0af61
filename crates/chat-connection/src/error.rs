//! Error types for the connection stack.

use rentchat_protocol::FrameError;

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Dropped link, timeout, broker hiccup. Retried with backoff.
    Transient,
    /// The negotiation endpoint itself is unusable. Never retried.
    Permanent,
}

/// Errors reported by a transport.
///
/// The variant decides the [`FailureClass`]; nothing is inferred from
/// message text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("negotiation endpoint unavailable: {0}")]
    EndpointUnavailable(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection lost: {0}")]
    Lost(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("heart-beat timed out")]
    HeartbeatTimeout,
}

impl TransportError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::EndpointUnavailable(_) => FailureClass::Permanent,
            _ => FailureClass::Transient,
        }
    }
}

/// Errors delivered to `on_error` callbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("no auth token available")]
    Unauthenticated,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("broker rejected the session: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("gave up after {attempts} reconnect attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ConnectError>,
    },
}

impl ConnectError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Transport(e) => e.class(),
            Self::Exhausted { .. } => FailureClass::Permanent,
            // Checked before any attempt; never reaches the retry policy.
            Self::Unauthenticated => FailureClass::Permanent,
            Self::Rejected(_) | Self::Protocol(_) => FailureClass::Transient,
        }
    }

    /// Returns `true` if this error means the manager has stopped retrying.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
            || matches!(self, Self::Transport(TransportError::EndpointUnavailable(_)))
    }
}
