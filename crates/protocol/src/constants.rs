use std::time::Duration;

/// STOMP versions offered in the CONNECT frame, most preferred first.
pub const STOMP_ACCEPT_VERSIONS: &str = "1.2,1.1,1.0";

/// Path appended to the application base URL to reach the broker endpoint.
pub const DEFAULT_ENDPOINT_PATH: &str = "/ws";

/// How often we offer to send heart-beats.
pub const DEFAULT_HEARTBEAT_OUTGOING: Duration = Duration::from_secs(10);

/// How often we ask the broker to send heart-beats.
pub const DEFAULT_HEARTBEAT_INCOMING: Duration = Duration::from_secs(10);

/// Multiplier applied to the negotiated incoming heart-beat interval before
/// the link is declared dead.
///
/// Any inbound traffic (frames or heart-beats) resets the deadline.
pub const HEARTBEAT_GRACE_FACTOR: u32 = 2;

/// Time allowed between sending CONNECT and receiving CONNECTED.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum WebSocket message size in bytes (1 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Content type attached to every SEND frame.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A heart-beat on the wire: a single end-of-line.
pub const HEARTBEAT_EOL: &str = "\n";

/// Default reconnect policy: number of retries after the first failure.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default reconnect policy: delay before the first retry.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default reconnect policy: backoff ceiling.
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
