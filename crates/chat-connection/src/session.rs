//! STOMP session on top of a [`Link`].
//!
//! [`handshake`] sends CONNECT and waits for CONNECTED. [`Session::run`]
//! then reads frames until the link fails or the session is cancelled,
//! sending heart-beats and enforcing the inbound heart-beat deadline.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use rentchat_protocol::constants::{HEARTBEAT_EOL, HEARTBEAT_GRACE_FACTOR, STOMP_ACCEPT_VERSIONS};
use rentchat_protocol::{Command, Frame, parse_frames};

use crate::error::{ConnectError, TransportError};
use crate::transport::{Link, LinkEvent};
use crate::types::HeartbeatConfig;

/// Parameters of a CONNECT frame.
pub(crate) struct ConnectRequest<'a> {
    pub(crate) host: &'a str,
    pub(crate) token: &'a str,
    pub(crate) heartbeat: HeartbeatConfig,
    pub(crate) timeout: Duration,
}

/// Heart-beat periods agreed with the broker. `None` means off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Negotiated {
    pub(crate) outgoing: Option<Duration>,
    pub(crate) incoming: Option<Duration>,
}

/// An established STOMP session.
pub(crate) struct Session {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<LinkEvent>,
    closer: CancellationToken,
    cancel: CancellationToken,
    heartbeat: Negotiated,
}

/// Cheap handle the manager keeps to write frames and end the session.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Queues a frame without waiting. Returns `false` if it was dropped.
    pub(crate) fn send(&self, frame: &Frame) -> bool {
        match self.outbound.try_send(frame.encode()) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = %frame.command, "dropping outbound frame: {e}");
                false
            }
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.outbound.is_closed()
    }

    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }
}

/// Sends CONNECT over `link` and waits for the broker's answer.
///
/// On failure the link is closed before returning.
pub(crate) async fn handshake(
    link: Link,
    request: ConnectRequest<'_>,
) -> Result<Session, ConnectError> {
    let (outbound, mut inbound, closer) = link.into_parts();

    let connected = match tokio::time::timeout(
        request.timeout,
        negotiate_session(&outbound, &mut inbound, &request),
    )
    .await
    {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => {
            closer.cancel();
            return Err(e);
        }
        Err(_) => {
            closer.cancel();
            return Err(TransportError::HandshakeTimeout.into());
        }
    };

    let heartbeat = negotiate(request.heartbeat, connected.get("heart-beat"));
    debug!(
        version = connected.get("version").unwrap_or("1.0"),
        server = connected.get("server").unwrap_or("unknown"),
        ?heartbeat,
        "STOMP session established"
    );

    Ok(Session {
        outbound,
        inbound,
        closer,
        cancel: CancellationToken::new(),
        heartbeat,
    })
}

async fn negotiate_session(
    outbound: &mpsc::Sender<String>,
    inbound: &mut mpsc::Receiver<LinkEvent>,
    request: &ConnectRequest<'_>,
) -> Result<Frame, ConnectError> {
    let connect = Frame::new(Command::Connect)
        .header("accept-version", STOMP_ACCEPT_VERSIONS)
        .header("host", request.host)
        .header("heart-beat", request.heartbeat.header_value())
        .header("Authorization", format!("Bearer {}", request.token));

    outbound
        .send(connect.encode())
        .await
        .map_err(|_| TransportError::Lost("link closed before CONNECT".into()))?;

    loop {
        match inbound.recv().await {
            Some(LinkEvent::Frame(text)) => {
                for frame in parse_frames(&text)? {
                    match frame.command {
                        Command::Connected => return Ok(frame),
                        Command::Error => {
                            return Err(ConnectError::Rejected(frame.error_message()));
                        }
                        other => trace!(command = %other, "ignoring frame before CONNECTED"),
                    }
                }
            }
            Some(LinkEvent::Error(e)) => return Err(e.into()),
            Some(LinkEvent::Closed { code, reason }) => {
                return Err(TransportError::Lost(close_reason(code, &reason)).into());
            }
            None => return Err(TransportError::Lost("transport ended".into()).into()),
        }
    }
}

/// Applies the STOMP heart-beat rule: each direction runs at the slower of
/// what one side offers and the other side wants, and is off if either
/// side says 0.
pub(crate) fn negotiate(ours: HeartbeatConfig, server_header: Option<&str>) -> Negotiated {
    let (server_send, server_want) = server_header
        .and_then(|h| h.split_once(','))
        .and_then(|(sx, sy)| Some((sx.trim().parse::<u64>().ok()?, sy.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));

    let pick = |mine: Duration, theirs_ms: u64| {
        if mine.is_zero() || theirs_ms == 0 {
            None
        } else {
            Some(mine.max(Duration::from_millis(theirs_ms)))
        }
    };

    Negotiated {
        outgoing: pick(ours.outgoing, server_want),
        incoming: pick(ours.incoming, server_send),
    }
}

impl Session {
    pub(crate) fn handle(&self) -> SessionHandle {
        SessionHandle {
            outbound: self.outbound.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Reads frames until the session ends.
    ///
    /// MESSAGE frames go to `on_message`. Returns `Ok(())` when the session
    /// was cancelled through its handle, or the failure that ended it.
    /// The link is closed either way.
    pub(crate) async fn run<F>(self, mut on_message: F) -> Result<(), ConnectError>
    where
        F: FnMut(Frame),
    {
        let Session {
            outbound,
            mut inbound,
            closer,
            cancel,
            heartbeat,
        } = self;

        if let Some(period) = heartbeat.outgoing {
            tokio::spawn(heartbeat_pump(outbound, period, cancel.clone()));
        }

        let deadline = heartbeat.incoming.map(|d| d * HEARTBEAT_GRACE_FACTOR);
        let silence = tokio::time::sleep(deadline.unwrap_or(Duration::from_secs(86_400)));
        tokio::pin!(silence);

        let result = 'session: loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),

                () = &mut silence, if deadline.is_some() => {
                    warn!("no inbound traffic within heart-beat window");
                    break Err(TransportError::HeartbeatTimeout.into());
                }

                event = inbound.recv() => match event {
                    Some(LinkEvent::Frame(text)) => {
                        if let Some(d) = deadline {
                            silence.as_mut().reset(Instant::now() + d);
                        }
                        let frames = match parse_frames(&text) {
                            Ok(frames) => frames,
                            Err(e) => {
                                debug!(error = %e, "dropping unparseable frame");
                                continue;
                            }
                        };
                        for frame in frames {
                            match frame.command {
                                Command::Message => on_message(frame),
                                Command::Error => {
                                    let reason = frame.error_message();
                                    warn!(%reason, "broker sent ERROR");
                                    break 'session Err(ConnectError::Rejected(reason));
                                }
                                Command::Receipt => {
                                    trace!(receipt = ?frame.get("receipt-id"), "receipt");
                                }
                                other => trace!(command = %other, "ignoring frame"),
                            }
                        }
                    }
                    Some(LinkEvent::Error(e)) => break Err(e.into()),
                    Some(LinkEvent::Closed { code, reason }) => {
                        break Err(TransportError::Lost(close_reason(code, &reason)).into());
                    }
                    None => break Err(TransportError::Lost("transport ended".into()).into()),
                },
            }
        };

        cancel.cancel();
        closer.cancel();
        result
    }
}

/// Writes a heart-beat EOL every `period` until cancelled.
async fn heartbeat_pump(outbound: mpsc::Sender<String>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if outbound.send(HEARTBEAT_EOL.to_string()).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn close_reason(code: Option<u16>, reason: &str) -> String {
    match (code, reason.is_empty()) {
        (Some(code), false) => format!("closed by peer ({code}: {reason})"),
        (Some(code), true) => format!("closed by peer ({code})"),
        (None, false) => format!("closed by peer ({reason})"),
        (None, true) => "closed by peer".to_string(),
    }
}
