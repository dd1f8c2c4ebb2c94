//! Public handle for a negotiating endpoint.

use std::future::pending;
use std::sync::Arc;

use flare_common::{Category, EndpointId, Signal};
use flare_config::PeerConfig;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{sleep_until, Instant};

use crate::link::{link_loop, LinkConfig, LinkEvent};
use crate::negotiator::{Input, Negotiator};
use crate::state::{ConnectionStatus, NegotiationState};
use crate::transport::{TaggedEvent, TransportFactory};
use crate::types::{PeerCommand, PeerEvent, RejectReason, SendOutcome, Snapshot};

const EVENT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 64;
const RELAY_OUT_BUFFER: usize = 64;
const LINK_EVENT_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for one endpoint: relay link, negotiation, and direct channel.
///
/// All methods talk to a background driver task. Dropping every handle, or
/// calling [`shutdown`](Self::shutdown), stops it.
#[derive(Clone)]
pub struct PeerClient {
    endpoint: EndpointId,
    command_tx: mpsc::Sender<PeerCommand>,
    shared: Arc<RwLock<Snapshot>>,
}

impl PeerClient {
    /// Start the relay link and the negotiation driver.
    /// Returns `(client, event_receiver)`.
    pub fn connect(
        config: PeerConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, mpsc::Receiver<PeerEvent>) {
        let endpoint = EndpointId::new();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (relay_out_tx, relay_out_rx) = mpsc::channel(RELAY_OUT_BUFFER);
        let (link_tx, link_rx) = mpsc::channel(LINK_EVENT_BUFFER);
        let shared = Arc::new(RwLock::new(Snapshot::default()));

        let link_config = LinkConfig {
            url: config.relay_url.clone(),
            connect_timeout: config.connect_timeout(),
            reconnect_delay_secs: config.reconnect_delay_secs,
            max_reconnect_delay_secs: config.max_reconnect_delay_secs,
        };

        let (negotiator, transport_rx) = Negotiator::new(
            endpoint.clone(),
            config,
            factory,
            relay_out_tx,
            event_tx,
            Arc::clone(&shared),
        );

        tracing::info!(endpoint = %endpoint, url = %link_config.url, "Starting peer client");
        tokio::spawn(link_loop(link_config, link_tx, relay_out_rx));
        tokio::spawn(drive(negotiator, link_rx, transport_rx, command_rx));

        let client = Self {
            endpoint,
            command_tx,
            shared,
        };
        (client, event_rx)
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Ask for a negotiation. Starts once the relay link is up.
    pub async fn negotiate(&self) {
        let _ = self.command_tx.send(PeerCommand::Negotiate).await;
    }

    /// Send a signal over the direct channel.
    ///
    /// Returns [`SendOutcome::Rejected`] when the channel is not ready;
    /// nothing is sent in that case.
    pub async fn send_signal(&self, message: impl Into<String>, category: Category) -> SendOutcome {
        let (reply, rx) = oneshot::channel();
        let command = PeerCommand::SendSignal {
            message: message.into(),
            category,
            reply,
        };
        if self.command_tx.send(command).await.is_err() {
            return SendOutcome::Rejected(RejectReason::NotConnected);
        }
        rx.await
            .unwrap_or(SendOutcome::Rejected(RejectReason::NotConnected))
    }

    pub async fn state(&self) -> NegotiationState {
        self.shared.read().await.state
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.shared.read().await.status
    }

    /// The most recent signal that actually left this endpoint.
    pub async fn last_sent(&self) -> Option<Signal> {
        self.shared.read().await.last_sent.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.shared.read().await.clone()
    }

    /// Close the direct channel and the relay link.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(PeerCommand::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Feed every input to the negotiator, one at a time.
async fn drive(
    mut negotiator: Negotiator,
    mut link_rx: mpsc::Receiver<LinkEvent>,
    mut transport_rx: mpsc::Receiver<TaggedEvent>,
    mut command_rx: mpsc::Receiver<PeerCommand>,
) {
    loop {
        let deadline = negotiator.deadline();
        tokio::select! {
            Some(event) = link_rx.recv() => {
                let input = match event {
                    LinkEvent::Connected => Input::RelayUp,
                    LinkEvent::Disconnected => Input::RelayDown,
                    LinkEvent::Message(text) => Input::RelayText(text),
                };
                negotiator.handle(input).await;
            }
            Some(tagged) = transport_rx.recv() => {
                negotiator.handle(Input::Transport(tagged)).await;
            }
            command = command_rx.recv() => match command {
                Some(PeerCommand::Negotiate) => negotiator.handle(Input::Negotiate).await,
                Some(PeerCommand::SendSignal { message, category, reply }) => {
                    let outcome = negotiator.send_signal(message, category).await;
                    let _ = reply.send(outcome);
                }
                Some(PeerCommand::Shutdown) | None => break,
            },
            _ = wait_for(deadline) => {
                negotiator.handle(Input::Deadline).await;
            }
        }
    }

    tracing::info!(state = %negotiator.state(), "Peer client stopping");
    negotiator.shutdown().await;
}
