//! flare-peer: negotiates a direct data channel through a flare relay and
//! exchanges button-press signals over it.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flare_common::Category;
//! use flare_config::PeerConfig;
//! use flare_peer::{ConnectionStatus, MemoryNetwork, PeerClient, PeerEvent};
//!
//! # async fn demo() {
//! let network = MemoryNetwork::new();
//! let (client, mut events) = PeerClient::connect(PeerConfig::default(), Arc::new(network));
//! while let Some(event) = events.recv().await {
//!     if event == PeerEvent::StatusChanged(ConnectionStatus::Connected) {
//!         client.send_signal("Help", Category::Status).await;
//!     }
//! }
//! # }
//! ```

pub mod client;
mod link;
mod negotiator;
pub mod state;
pub mod transport;
pub mod types;

pub use client::PeerClient;
pub use state::{ConnectionStatus, NegotiationState, Role};
pub use transport::{
    MemoryNetwork, MemoryTransport, PeerTransport, TaggedEvent, TransportEvent, TransportFactory,
    TransportSink,
};
#[cfg(feature = "webrtc")]
pub use transport::{WebRtcFactory, WebRtcTransport};
pub use types::{PeerEvent, RejectReason, SendOutcome, Snapshot};
