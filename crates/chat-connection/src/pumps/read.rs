//! WebSocket read pump. Turns socket messages into [`LinkEvent`]s.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::transport::LinkEvent;

/// Reads messages from the WebSocket and forwards them to the link.
///
/// Exactly one terminal event (`Closed` or `Error`) is forwarded when the
/// socket ends on its own. The link is marked closed on exit so the write
/// pump stops too.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound: mpsc::Sender<LinkEvent>,
    closed: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,

            msg = read.next() => {
                let event = match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        LinkEvent::Frame(text.as_str().to_owned())
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        match String::from_utf8(data.to_vec()) {
                            Ok(text) => LinkEvent::Frame(text),
                            Err(_) => {
                                warn!("dropping non UTF-8 binary message");
                                continue;
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        trace!("received ping");
                        continue;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("received pong");
                        continue;
                    }
                    Some(Ok(tungstenite::Message::Frame(_))) => continue,
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                            None => (None, String::new()),
                        };
                        debug!(?code, %reason, "received close frame");
                        let _ = inbound.send(LinkEvent::Closed { code, reason }).await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        let _ = inbound
                            .send(LinkEvent::Error(TransportError::Lost(e.to_string())))
                            .await;
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        let _ = inbound
                            .send(LinkEvent::Closed {
                                code: None,
                                reason: "stream ended".into(),
                            })
                            .await;
                        break;
                    }
                };

                if inbound.send(event).await.is_err() {
                    break;
                }
            }
        }
    }

    closed.cancel();
}
