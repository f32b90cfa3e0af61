//! Connection configuration.
//!
//! Durations are expressed in milliseconds so the structure reads naturally
//! from TOML or JSON:
//!
//! ```toml
//! base_url = "https://rent.example.com"
//! endpoint_path = "/ws"
//! handshake_timeout_ms = 10000
//!
//! [reconnect]
//! max_attempts = 5
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//!
//! [heartbeat]
//! outgoing_ms = 10000
//! incoming_ms = 10000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rentchat_protocol::constants::{DEFAULT_ENDPOINT_PATH, HANDSHAKE_TIMEOUT};

use crate::types::{HeartbeatConfig, ReconnectConfig};

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported base URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("base URL has no host: {0}")]
    MissingHost(String),

    #[error("base URL must not carry a fragment: {0}")]
    Fragment(String),
}

/// Settings for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Application base URL (`http`, `https`, `ws` or `wss`).
    pub base_url: String,
    /// Path appended to the base URL to reach the broker endpoint.
    pub endpoint_path: String,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
    #[serde(rename = "handshake_timeout_ms", with = "duration_ms")]
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

/// A validated broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    /// Host (and port, if any) sent in the CONNECT `host` header.
    pub host: String,
}

impl ConnectionConfig {
    /// Config with defaults pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Derives the WebSocket endpoint from the base URL and path suffix.
    ///
    /// `http` maps to `ws` and `https` to `wss`. A query string on the base
    /// URL is kept after the path suffix; fragments are rejected.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let base = self.base_url.trim().trim_end_matches('/');
        let (scheme, rest) = base
            .split_once("://")
            .ok_or_else(|| ConfigError::UnsupportedScheme(base.to_string()))?;
        let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        if rest.contains('#') {
            return Err(ConfigError::Fragment(self.base_url.clone()));
        }
        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location.trim_end_matches('/'), Some(query)),
            None => (rest, None),
        };
        let host = location.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(ConfigError::MissingHost(self.base_url.clone()));
        }

        let path = self.endpoint_path.trim();
        let mut url = if path.is_empty() {
            format!("{ws_scheme}://{location}")
        } else if path.starts_with('/') {
            format!("{ws_scheme}://{location}{path}")
        } else {
            format!("{ws_scheme}://{location}/{path}")
        };
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        Ok(Endpoint {
            url,
            host: host.to_string(),
        })
    }
}

/// Serde adapter storing a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
