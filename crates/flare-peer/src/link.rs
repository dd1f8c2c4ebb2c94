//! Background relay connection with auto-reconnect.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// What the relay link reports to the client driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkEvent {
    Connected,
    Disconnected,
    Message(String),
}

#[derive(Debug, Clone)]
pub(crate) struct LinkConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

/// Next backoff delay: double, capped.
pub(crate) fn next_delay(current: u64, max: u64) -> u64 {
    current.saturating_mul(2).min(max).max(1)
}

/// Keep a relay connection up until the driver goes away.
///
/// Outbound text queued while the link is down is discarded on reconnect;
/// negotiation envelopes are only meaningful to the relay members present
/// when they were produced.
pub(crate) async fn link_loop(
    config: LinkConfig,
    event_tx: mpsc::Sender<LinkEvent>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        let mut stale = 0;
        while outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded relay messages queued while offline");
        }

        info!(url = %config.url, "Connecting to relay");

        match tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                if event_tx.send(LinkEvent::Connected).await.is_err() {
                    return;
                }

                let (mut ws_write, mut ws_read) = ws_stream.split();

                loop {
                    tokio::select! {
                        frame = ws_read.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                let event = LinkEvent::Message(text.to_string());
                                if event_tx.send(event).await.is_err() {
                                    let _ = ws_write.close().await;
                                    return;
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("Relay closed connection");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "Relay WebSocket error");
                                break;
                            }
                            Some(Ok(_)) => {}
                        },
                        outbound = outbound_rx.recv() => match outbound {
                            Some(text) => {
                                if let Err(e) = ws_write.send(WsMessage::Text(text.into())).await {
                                    warn!(error = %e, "Relay send failed");
                                    break;
                                }
                            }
                            None => {
                                let _ = ws_write.close().await;
                                return;
                            }
                        },
                    }
                }

                if event_tx.send(LinkEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to relay");
                if event_tx.send(LinkEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout.as_secs(),
                    "Relay connection timed out"
                );
                if event_tx.send(LinkEvent::Disconnected).await.is_err() {
                    return;
                }
            }
        }

        // Exponential backoff reconnect.
        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(reconnect_delay)) => {}
            _ = event_tx.closed() => return,
        }
        reconnect_delay = next_delay(reconnect_delay, config.max_reconnect_delay_secs);
    }
}
