//! Shared types for the flare relay and peer crates.
//!
//! Everything that crosses a process boundary lives here: the negotiation
//! envelope carried by the relay, the signal payload carried by the direct
//! channel, and the feedback table that maps signal codes to flash colors
//! and vibration patterns.

pub mod envelope;
pub mod errors;
pub mod feedback;
pub mod id;
pub mod signal;

pub use envelope::{Envelope, IceCandidate, SdpKind, SessionDescription};
pub use errors::{ConfigError, FlareError, TransportError};
pub use feedback::{feedback_for, Cue, Feedback, Urgency, FLASH_DURATION_MS};
pub use id::{ConnectionId, EndpointId};
pub use signal::{Category, Signal};

pub type Result<T> = std::result::Result<T, FlareError>;
