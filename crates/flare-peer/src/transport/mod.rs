//! The seam between negotiation and the real-time transport.
//!
//! The negotiator never touches SDP or ICE itself. It asks a
//! [`PeerTransport`] for descriptions, hands it remote candidates, and
//! listens for [`TransportEvent`]s on a channel.

mod memory;
#[cfg(feature = "webrtc")]
mod rtc;

use std::sync::Arc;

use async_trait::async_trait;
use flare_common::{IceCandidate, SessionDescription, TransportError};
use tokio::sync::mpsc;

pub use memory::{MemoryNetwork, MemoryTransport};
#[cfg(feature = "webrtc")]
pub use rtc::{WebRtcFactory, WebRtcTransport};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Asynchronous notifications from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A local network path was discovered and should reach the remote side.
    LocalCandidate(IceCandidate),
    /// The direct channel is open and writable.
    ChannelOpen,
    /// A text message arrived on the direct channel.
    Message(String),
    /// The direct channel closed.
    ChannelClosed,
}

/// A transport event stamped with the transport instance it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Where a transport reports its events.
///
/// Emitting never blocks: transport callbacks run on foreign tasks and the
/// negotiator may be awaiting the same transport when they fire.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::Sender<TaggedEvent>,
}

impl TransportSink {
    pub fn new(generation: u64, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: TransportEvent) {
        let tagged = TaggedEvent {
            generation: self.generation,
            event,
        };
        if let Err(e) = self.tx.try_send(tagged) {
            tracing::warn!(generation = self.generation, error = %e, "Dropping transport event");
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One peer connection plus its data channel.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Open the data channel and produce a local offer.
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError>;

    /// Apply the remote answer to our outstanding offer.
    async fn accept_answer(&self, answer: SessionDescription) -> Result<(), TransportError>;

    /// Apply one remote candidate. Only called once a remote description is set.
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Send a text message on the data channel.
    async fn send(&self, text: String) -> Result<(), TransportError>;

    /// Whether the data channel can take a message right now.
    async fn is_writable(&self) -> bool;

    /// Tear down the connection. Idempotent.
    async fn close(&self);
}

/// Builds a fresh transport for each negotiation cycle.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, sink: TransportSink) -> Result<Arc<dyn PeerTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_tags_events_with_generation() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = TransportSink::new(7, tx);
        sink.emit(TransportEvent::ChannelOpen);

        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.generation, 7);
        assert_eq!(tagged.event, TransportEvent::ChannelOpen);
    }

    #[tokio::test]
    async fn sink_drops_when_full_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = TransportSink::new(1, tx);
        sink.emit(TransportEvent::ChannelOpen);
        sink.emit(TransportEvent::ChannelClosed);

        assert_eq!(rx.recv().await.unwrap().event, TransportEvent::ChannelOpen);
        assert!(rx.try_recv().is_err());
    }
}
