//! Wires the token source, transport and connection manager together.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use rentchat_connection::{
    ConnectError, ConnectionEvent, ConnectionManager, FailureClass, OnConnected, OnError,
    TokenProvider, WsTransport,
};
use rentchat_protocol::destinations;
use rentchat_protocol::messages::ChatMessage;

use crate::config::Config;

/// Runs the probe until stdin closes or Ctrl-C is pressed.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let source = config.clone();
    let tokens: Arc<dyn TokenProvider> = Arc::new(move || source.resolve_token());
    if tokens.token().is_none() {
        tracing::warn!(env = crate::config::TOKEN_ENV, "no access token configured");
    }
    let manager = ConnectionManager::new(
        config.connection.clone(),
        Arc::new(WsTransport::default()),
        tokens,
    )?;
    tracing::info!(url = manager.endpoint_url(), "chat endpoint");

    if let Some(mut events) = manager.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ConnectionEvent::StateChanged(state) => tracing::info!(%state, "state"),
                    ConnectionEvent::Reconnecting { attempt, delay } => {
                        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "retrying")
                    }
                    ConnectionEvent::Failed(_) => {}
                }
            }
        });
    }

    manager.connect(Some(on_connected(&manager, &config.room)), Some(on_error()));

    let send_to = destinations::send_message(&config.room);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" => break,
                    "/status" => tracing::info!(
                        state = %manager.state(),
                        connected = manager.connected(),
                        attempts = manager.reconnect_attempts(),
                        subscriptions = manager.subscription_count(),
                        "status"
                    ),
                    "/reconnect" => {
                        manager.disconnect();
                        manager.connect(
                            Some(on_connected(&manager, &config.room)),
                            Some(on_error()),
                        );
                    }
                    content => {
                        if !manager.connected() {
                            tracing::warn!("not connected, message not sent");
                            continue;
                        }
                        let msg = ChatMessage::outgoing(&config.room, &config.sender_id, content);
                        manager.publish(&send_to, &msg);
                    }
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}

/// Subscribes to the room every time a session comes up.
fn on_connected(manager: &ConnectionManager, room: &str) -> OnConnected {
    let manager = manager.downgrade();
    let topic = destinations::room_topic(room);
    Arc::new(move || {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        tracing::info!(%topic, "connected, subscribing");
        manager.subscribe(&topic, |payload| {
            match serde_json::from_value::<ChatMessage>(payload) {
                Ok(msg) => println!(
                    "[{}] {}: {}",
                    msg.sent_at.format("%H:%M:%S"),
                    msg.sender_id,
                    msg.content
                ),
                Err(e) => tracing::debug!(error = %e, "ignoring non-chat payload"),
            }
        });
    })
}

fn on_error() -> OnError {
    Arc::new(|err: &ConnectError| {
        if err.class() == FailureClass::Permanent {
            tracing::error!(error = %err, "realtime chat disabled, fall back to polling");
        } else {
            tracing::warn!(error = %err, "realtime chat error");
        }
    })
}
