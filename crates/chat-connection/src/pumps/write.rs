//! WebSocket write pump. Serialises outbound text onto the socket.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Writes queued text to the WebSocket until the link is closed.
///
/// Text already queued when the link closes (a DISCONNECT frame, typically)
/// is still flushed before the close frame.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut outbound: mpsc::Receiver<String>,
    closed: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            text = outbound.recv() => {
                match text {
                    Some(t) => {
                        if let Err(e) = write.send(tungstenite::Message::Text(t.into())).await {
                            error!("WebSocket write error: {e}");
                            closed.cancel();
                            return;
                        }
                    }
                    None => break,
                }
            }
            _ = closed.cancelled() => break,
        }
    }

    while let Ok(t) = outbound.try_recv() {
        trace!("flushing queued frame before close");
        if write.send(tungstenite::Message::Text(t.into())).await.is_err() {
            break;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn recording_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn write_pump_stops_on_close_and_flushes() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let closed = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::channel(16);

        out_tx.send("DISCONNECT\n\n\0".to_string()).await.unwrap();
        closed.cancel();

        let handle = tokio::spawn(write_pump(recording_sink(sink_tx), out_rx, closed));
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let first = sink_rx.recv().await.unwrap();
        assert!(matches!(first, tungstenite::Message::Text(ref t) if t.as_str() == "DISCONNECT\n\n\0"));
        let last = sink_rx.recv().await.unwrap();
        assert!(matches!(last, tungstenite::Message::Close(_)));
    }

    #[tokio::test]
    async fn write_pump_forwards_text() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let closed = CancellationToken::new();
        let (out_tx, out_rx) = mpsc::channel(16);

        let handle = tokio::spawn(write_pump(recording_sink(sink_tx), out_rx, closed.clone()));
        out_tx.send("\n".to_string()).await.unwrap();

        let msg = sink_rx.recv().await.unwrap();
        assert!(matches!(msg, tungstenite::Message::Text(ref t) if t.as_str() == "\n"));

        drop(out_tx);
        handle.await.unwrap();
        assert!(matches!(sink_rx.recv().await, Some(tungstenite::Message::Close(_))));
    }
}
