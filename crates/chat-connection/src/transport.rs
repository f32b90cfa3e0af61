//! Transport seam between the connection manager and the network.
//!
//! A transport produces a [`Link`]: an outbound text channel, an inbound
//! event channel and a close signal. The manager never touches sockets
//! directly, so tests and alternative transports plug in through
//! [`TransportFactory`].

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Something that happened on the far side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text message (one or more STOMP frames, or a heart-beat).
    Frame(String),
    /// The link failed.
    Error(TransportError),
    /// The link was closed by the peer.
    Closed { code: Option<u16>, reason: String },
}

/// Client side of an open duplex link.
pub struct Link {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<LinkEvent>,
    closer: CancellationToken,
}

/// Transport side of a [`Link`], driven by pumps or by a test double.
pub struct LinkPeer {
    /// Text the client wants written.
    pub outbound: mpsc::Receiver<String>,
    /// Events to deliver to the client.
    pub inbound: mpsc::Sender<LinkEvent>,
    /// Cancelled when the client closes the link.
    pub closed: CancellationToken,
}

impl Link {
    /// Creates a connected link/peer pair with bounded buffers.
    pub fn pair(capacity: usize) -> (Link, LinkPeer) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let closer = CancellationToken::new();
        let link = Link {
            outbound: out_tx,
            inbound: in_rx,
            closer: closer.clone(),
        };
        let peer = LinkPeer {
            outbound: out_rx,
            inbound: in_tx,
            closed: closer,
        };
        (link, peer)
    }

    /// Signals the transport to tear the link down.
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub(crate) fn closer(&self) -> CancellationToken {
        self.closer.clone()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::Sender<String>,
        mpsc::Receiver<LinkEvent>,
        CancellationToken,
    ) {
        (self.outbound, self.inbound, self.closer)
    }
}

/// Opens links to the broker endpoint.
pub trait TransportFactory: Send + Sync {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Link, TransportError>>;
}
