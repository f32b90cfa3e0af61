//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each [`open`](TransportFactory::open) performs the HTTP upgrade, splits
//! the socket and spawns a read pump and a write pump that bridge it to a
//! [`Link`].

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, warn};

use rentchat_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::error::TransportError;
use crate::pumps::{read::read_pump, write::write_pump};
use crate::transport::{Link, TransportFactory};

/// Buffered messages per direction.
const LINK_CAPACITY: usize = 256;

/// Opens plain WebSocket connections to the broker.
#[derive(Debug, Clone)]
pub struct WsTransport {
    max_message_size: usize,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the maximum accepted message size.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }
}

impl TransportFactory for WsTransport {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Link, TransportError>> {
        Box::pin(async move {
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(self.max_message_size);
            ws_config.max_frame_size = Some(self.max_message_size);

            let (ws_stream, response) =
                tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false)
                    .await
                    .map_err(classify_connect_error)?;
            debug!(url, status = %response.status(), "WebSocket upgraded");

            let (write, read) = ws_stream.split();
            let (link, peer) = Link::pair(LINK_CAPACITY);

            tokio::spawn(write_pump(write, peer.outbound, peer.closed.clone()));
            tokio::spawn(read_pump(read, peer.inbound, peer.closed));

            Ok(link)
        })
    }
}

/// Maps an upgrade failure onto the transport error taxonomy.
///
/// A malformed URL or a 4xx answer to the upgrade request means the
/// endpoint itself is wrong or gone: permanent. Everything else (refused,
/// reset, TLS hiccup, 5xx while the backend restarts) is transient.
pub(crate) fn classify_connect_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Url(e) => TransportError::EndpointUnavailable(e.to_string()),
        tungstenite::Error::Http(response) => classify_http_status(response.status()),
        other => TransportError::Connect(other.to_string()),
    }
}

fn classify_http_status(status: StatusCode) -> TransportError {
    if status.is_client_error() {
        warn!(%status, "broker endpoint rejected the upgrade");
        TransportError::EndpointUnavailable(format!("upgrade rejected with HTTP {status}"))
    } else {
        TransportError::Connect(format!("upgrade failed with HTTP {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureClass;
    #[test]
    fn client_errors_are_permanent() {
        let err = classify_http_status(StatusCode::NOT_FOUND);
        assert_eq!(err.class(), FailureClass::Permanent);
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_http_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.class(), FailureClass::Transient);
    }

    #[test]
    fn url_errors_are_permanent() {
        let err = classify_connect_error(tungstenite::Error::Url(
            tungstenite::error::UrlError::NoHostName,
        ));
        assert_eq!(err.class(), FailureClass::Permanent);
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify_connect_error(tungstenite::Error::Io(io));
        assert_eq!(err.class(), FailureClass::Transient);
    }

    #[tokio::test]
    async fn unreachable_host_fails_without_panicking() {
        // Port 9 on localhost is almost never listening.
        let result = WsTransport::new().open("ws://127.0.0.1:9/ws").await;
        assert!(result.is_err());
    }
}
