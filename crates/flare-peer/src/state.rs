//! Negotiation states and the transitions allowed between them.

use std::fmt;

/// Where an endpoint is in establishing its direct channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    /// Producing a local description (offerer), or answered and waiting
    /// for the channel to open (responder).
    AwaitingLocalDescription,
    /// Offer sent; waiting for the answer and then for the channel.
    AwaitingRemoteDescription,
    Connected,
    Disconnected,
}

impl NegotiationState {
    /// Whether `self -> next` is a legal step.
    pub fn can_transition(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        matches!(
            (self, next),
            (Idle, AwaitingLocalDescription)
                | (AwaitingLocalDescription, AwaitingRemoteDescription)
                | (AwaitingLocalDescription, Connected)
                | (AwaitingLocalDescription, Disconnected)
                // Glare: our offer yields to the remote one.
                | (AwaitingRemoteDescription, AwaitingLocalDescription)
                | (AwaitingRemoteDescription, Connected)
                | (AwaitingRemoteDescription, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected, Idle)
        )
    }

    /// A negotiation is underway and bounded by a deadline.
    pub fn is_awaiting(self) -> bool {
        matches!(
            self,
            NegotiationState::AwaitingLocalDescription
                | NegotiationState::AwaitingRemoteDescription
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::AwaitingLocalDescription => "awaiting-local-description",
            NegotiationState::AwaitingRemoteDescription => "awaiting-remote-description",
            NegotiationState::Connected => "connected",
            NegotiationState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Which side of the offer/answer exchange this endpoint took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Coarse status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
        }
    }
}
