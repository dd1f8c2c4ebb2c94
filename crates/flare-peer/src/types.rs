//! Events, commands, and outcomes for the peer client.

use flare_common::{Category, Cue, Feedback, Signal};
use tokio::sync::oneshot;

use crate::state::{ConnectionStatus, NegotiationState};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Notifications delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    StatusChanged(ConnectionStatus),
    StateChanged {
        from: NegotiationState,
        to: NegotiationState,
    },
    /// A signal arrived on the direct channel.
    SignalReceived { signal: Signal, feedback: Feedback },
    /// A local haptic cue to play.
    Cue(Cue),
    Error(String),
}

// ---------------------------------------------------------------------------
// Send outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The direct channel has not been established.
    NotConnected,
    /// Connected, but the channel refused the write.
    NotWritable,
}

/// Result of `send_signal`. A rejection is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Signal),
    Rejected(RejectReason),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }

    pub fn cue(&self) -> Cue {
        match self {
            SendOutcome::Sent(_) => Cue::Sent,
            SendOutcome::Rejected(_) => Cue::Rejected,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests from a [`PeerClient`](crate::PeerClient) handle to its driver.
#[derive(Debug)]
pub(crate) enum PeerCommand {
    Negotiate,
    SendSignal {
        message: String,
        category: Category,
        reply: oneshot::Sender<SendOutcome>,
    },
    Shutdown,
}

/// Point-in-time view of a client, shared with its handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: NegotiationState,
    pub status: ConnectionStatus,
    pub last_sent: Option<Signal>,
}
