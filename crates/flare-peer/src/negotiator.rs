//! The negotiation state machine.
//!
//! A [`Negotiator`] owns one endpoint's side of the handshake. It is driven
//! one [`Input`] at a time by the client task, talks to the relay through an
//! outbound queue, and to the direct channel through a [`PeerTransport`].

use std::collections::VecDeque;
use std::sync::Arc;

use flare_common::{
    feedback_for, Category, Cue, EndpointId, Envelope, IceCandidate, SessionDescription, Signal,
    TransportError,
};
use flare_config::PeerConfig;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::state::{ConnectionStatus, NegotiationState, Role};
use crate::transport::{PeerTransport, TaggedEvent, TransportEvent, TransportFactory, TransportSink};
use crate::types::{PeerEvent, RejectReason, SendOutcome, Snapshot};

/// Remote candidates held while no remote description exists.
const MAX_PENDING_CANDIDATES: usize = 64;

const TRANSPORT_EVENT_BUFFER: usize = 256;

/// Everything that can move the state machine.
#[derive(Debug)]
pub(crate) enum Input {
    /// Local intent to negotiate.
    Negotiate,
    RelayUp,
    RelayDown,
    RelayText(String),
    Transport(TaggedEvent),
    /// The current deadline may have passed.
    Deadline,
}

pub(crate) struct Negotiator {
    endpoint: EndpointId,
    config: PeerConfig,
    factory: Arc<dyn TransportFactory>,
    transport: Option<Arc<dyn PeerTransport>>,
    generation: u64,
    transport_tx: mpsc::Sender<TaggedEvent>,
    role: Option<Role>,
    state: NegotiationState,
    status: ConnectionStatus,
    remote_described: bool,
    pending_candidates: VecDeque<IceCandidate>,
    relay_up: bool,
    pending_negotiate: bool,
    deadline: Option<Instant>,
    relay_out: mpsc::Sender<String>,
    events: mpsc::Sender<PeerEvent>,
    shared: Arc<RwLock<Snapshot>>,
}

impl Negotiator {
    /// Build a negotiator. The returned receiver carries events from every
    /// transport this negotiator creates.
    pub(crate) fn new(
        endpoint: EndpointId,
        config: PeerConfig,
        factory: Arc<dyn TransportFactory>,
        relay_out: mpsc::Sender<String>,
        events: mpsc::Sender<PeerEvent>,
        shared: Arc<RwLock<Snapshot>>,
    ) -> (Self, mpsc::Receiver<TaggedEvent>) {
        let (transport_tx, transport_rx) = mpsc::channel(TRANSPORT_EVENT_BUFFER);
        let negotiator = Self {
            endpoint,
            config,
            factory,
            transport: None,
            generation: 0,
            transport_tx,
            role: None,
            state: NegotiationState::Idle,
            status: ConnectionStatus::Disconnected,
            remote_described: false,
            pending_candidates: VecDeque::new(),
            relay_up: false,
            pending_negotiate: false,
            deadline: None,
            relay_out,
            events,
            shared,
        };
        (negotiator, transport_rx)
    }

    pub(crate) fn state(&self) -> NegotiationState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn role(&self) -> Option<Role> {
        self.role
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) async fn handle(&mut self, input: Input) {
        match input {
            Input::Negotiate => self.on_negotiate().await,
            Input::RelayUp => self.on_relay_up().await,
            Input::RelayDown => self.on_relay_down().await,
            Input::RelayText(text) => self.on_relay_text(&text).await,
            Input::Transport(tagged) => self.on_transport(tagged).await,
            Input::Deadline => self.on_deadline().await,
        }
    }

    // -----------------------------------------------------------------------
    // Relay link
    // -----------------------------------------------------------------------

    async fn on_negotiate(&mut self) {
        if !self.relay_up {
            info!(endpoint = %self.endpoint, "Relay link is down; will offer once it is up");
            self.pending_negotiate = true;
            return;
        }
        match self.state {
            NegotiationState::Idle => self.start_offer().await,
            NegotiationState::Disconnected => {
                self.transition(NegotiationState::Idle).await;
                self.start_offer().await;
            }
            state => debug!(endpoint = %self.endpoint, %state, "Negotiation already underway"),
        }
    }

    async fn on_relay_up(&mut self) {
        self.relay_up = true;
        if self.state == NegotiationState::Connected {
            debug!(endpoint = %self.endpoint, "Relay link up while connected");
            return;
        }

        self.set_status(ConnectionStatus::Connecting).await;
        if self.state == NegotiationState::Disconnected {
            self.transition(NegotiationState::Idle).await;
        }

        let wanted = std::mem::take(&mut self.pending_negotiate) || self.config.auto_negotiate;
        if wanted && self.state == NegotiationState::Idle {
            self.start_offer().await;
        }
    }

    async fn on_relay_down(&mut self) {
        self.relay_up = false;
        match self.state {
            NegotiationState::Connected => {
                info!(endpoint = %self.endpoint, "Relay link lost; direct channel unaffected");
            }
            state if state.is_awaiting() => {
                warn!(endpoint = %self.endpoint, %state, "Relay link lost mid-negotiation");
                self.abandon().await;
            }
            _ => self.set_status(ConnectionStatus::Disconnected).await,
        }
    }

    async fn on_relay_text(&mut self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Dropping undecodable relay message");
                return;
            }
        };
        debug!(endpoint = %self.endpoint, kind = envelope.kind(), "Relay message");

        match envelope {
            Envelope::Offer { offer } => self.on_offer(offer).await,
            Envelope::Answer { answer } => self.on_answer(answer).await,
            Envelope::Candidate { candidate } => self.on_remote_candidate(candidate).await,
        }
    }

    // -----------------------------------------------------------------------
    // Offer / answer
    // -----------------------------------------------------------------------

    async fn start_offer(&mut self) {
        let Some(transport) = self.new_transport().await else {
            return;
        };
        self.pending_candidates.clear();
        self.role = Some(Role::Initiator);
        self.transition(NegotiationState::AwaitingLocalDescription)
            .await;

        let deadline = Instant::now() + self.config.description_timeout();
        self.deadline = Some(deadline);

        match timeout_at(deadline, transport.create_offer()).await {
            Err(_) => self.expire("local offer was not produced in time").await,
            Ok(Err(e)) => self.report_failure("create offer", e).await,
            Ok(Ok(offer)) => {
                self.send_envelope(Envelope::Offer { offer });
                self.transition(NegotiationState::AwaitingRemoteDescription)
                    .await;
                self.deadline = Some(Instant::now() + self.config.answer_timeout());
            }
        }
    }

    async fn on_offer(&mut self, offer: SessionDescription) {
        match self.state {
            NegotiationState::Connected => {
                info!(endpoint = %self.endpoint, "Ignoring offer: already connected");
                return;
            }
            NegotiationState::AwaitingLocalDescription if self.role == Some(Role::Responder) => {
                info!(endpoint = %self.endpoint, "Fresh offer while answering; switching to it");
                self.drop_transport().await;
                self.pending_candidates.clear();
            }
            NegotiationState::AwaitingLocalDescription => {
                info!(endpoint = %self.endpoint, "Ignoring offer: our own offer is pending");
                return;
            }
            NegotiationState::AwaitingRemoteDescription => {
                info!(endpoint = %self.endpoint, "Offer collision; yielding to the remote offer");
                self.drop_transport().await;
            }
            NegotiationState::Disconnected => {
                self.transition(NegotiationState::Idle).await;
            }
            NegotiationState::Idle => {}
        }
        self.answer_offer(offer).await;
    }

    async fn answer_offer(&mut self, offer: SessionDescription) {
        let Some(transport) = self.new_transport().await else {
            if self.state.is_awaiting() {
                self.abandon().await;
            }
            return;
        };
        self.role = Some(Role::Responder);
        if self.state != NegotiationState::AwaitingLocalDescription {
            self.transition(NegotiationState::AwaitingLocalDescription)
                .await;
        }
        self.set_status(ConnectionStatus::Connecting).await;

        let deadline = Instant::now() + self.config.description_timeout();
        self.deadline = Some(deadline);

        match timeout_at(deadline, transport.accept_offer(offer)).await {
            Err(_) => self.expire("local answer was not produced in time").await,
            Ok(Err(e)) => self.report_failure("accept offer", e).await,
            Ok(Ok(answer)) => {
                self.remote_described = true;
                self.send_envelope(Envelope::Answer { answer });
                self.flush_candidates(&transport).await;
                self.deadline = Some(Instant::now() + self.config.answer_timeout());
            }
        }
    }

    async fn on_answer(&mut self, answer: SessionDescription) {
        if self.state != NegotiationState::AwaitingRemoteDescription || self.remote_described {
            info!(endpoint = %self.endpoint, state = %self.state, "Ignoring answer: none expected");
            return;
        }
        let Some(transport) = self.transport.clone() else {
            return;
        };

        let deadline = self
            .deadline
            .unwrap_or_else(|| Instant::now() + self.config.answer_timeout());

        match timeout_at(deadline, transport.accept_answer(answer)).await {
            Err(_) => self.expire("answer could not be applied in time").await,
            Ok(Err(e)) => self.report_failure("accept answer", e).await,
            Ok(Ok(())) => {
                debug!(endpoint = %self.endpoint, "Remote answer applied");
                self.remote_described = true;
                self.flush_candidates(&transport).await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Candidates
    // -----------------------------------------------------------------------

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        match (&self.transport, self.remote_described) {
            (Some(transport), true) => {
                let transport = Arc::clone(transport);
                if let Err(e) = transport.add_candidate(candidate).await {
                    warn!(endpoint = %self.endpoint, error = %e, "Remote candidate rejected");
                }
            }
            _ => {
                if self.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
                    warn!(endpoint = %self.endpoint, "Candidate buffer full; dropping oldest");
                    self.pending_candidates.pop_front();
                }
                self.pending_candidates.push_back(candidate);
                debug!(
                    endpoint = %self.endpoint,
                    buffered = self.pending_candidates.len(),
                    "Buffered remote candidate"
                );
            }
        }
    }

    async fn flush_candidates(&mut self, transport: &Arc<dyn PeerTransport>) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = transport.add_candidate(candidate).await {
                warn!(endpoint = %self.endpoint, error = %e, "Buffered candidate rejected");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    async fn on_transport(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation || self.transport.is_none() {
            debug!(
                endpoint = %self.endpoint,
                generation = tagged.generation,
                "Ignoring event from a retired transport"
            );
            return;
        }

        match tagged.event {
            TransportEvent::LocalCandidate(candidate) => {
                self.send_envelope(Envelope::Candidate { candidate });
            }
            TransportEvent::ChannelOpen => self.on_channel_open().await,
            TransportEvent::Message(text) => self.on_channel_message(&text).await,
            TransportEvent::ChannelClosed => self.on_channel_closed().await,
        }
    }

    async fn on_channel_open(&mut self) {
        if !self.state.is_awaiting() {
            debug!(endpoint = %self.endpoint, state = %self.state, "Ignoring channel-open");
            return;
        }
        self.deadline = None;
        self.transition(NegotiationState::Connected).await;
        self.set_status(ConnectionStatus::Connected).await;
        self.emit(PeerEvent::Cue(Cue::ChannelOpen)).await;
        info!(endpoint = %self.endpoint, role = ?self.role, "Direct channel open");
    }

    async fn on_channel_message(&mut self, text: &str) {
        let signal = match Signal::decode(text) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Dropping undecodable signal");
                return;
            }
        };
        let feedback = feedback_for(&signal);
        info!(
            endpoint = %self.endpoint,
            message = %signal.message,
            category = %signal.category,
            recognized = feedback.recognized,
            "Signal received"
        );
        self.emit(PeerEvent::SignalReceived { signal, feedback }).await;
    }

    async fn on_channel_closed(&mut self) {
        info!(endpoint = %self.endpoint, "Direct channel closed");
        self.abandon().await;
    }

    async fn on_deadline(&mut self) {
        let Some(deadline) = self.deadline else {
            return;
        };
        if Instant::now() < deadline || !self.state.is_awaiting() {
            return;
        }
        let reason = match (self.state, self.role) {
            (NegotiationState::AwaitingRemoteDescription, _) => "no answer or channel in time",
            (_, Some(Role::Responder)) => "channel did not open in time",
            _ => "local description was not produced in time",
        };
        self.expire(reason).await;
    }

    // -----------------------------------------------------------------------
    // Signals
    // -----------------------------------------------------------------------

    pub(crate) async fn send_signal(&mut self, message: String, category: Category) -> SendOutcome {
        let outcome = self.try_send(message, category).await;
        match &outcome {
            SendOutcome::Sent(signal) => {
                info!(endpoint = %self.endpoint, message = %signal.message, "Signal sent");
                self.shared.write().await.last_sent = Some(signal.clone());
            }
            SendOutcome::Rejected(reason) => {
                info!(endpoint = %self.endpoint, ?reason, "Signal rejected");
            }
        }
        self.emit(PeerEvent::Cue(outcome.cue())).await;
        outcome
    }

    async fn try_send(&self, message: String, category: Category) -> SendOutcome {
        if self.state != NegotiationState::Connected {
            return SendOutcome::Rejected(RejectReason::NotConnected);
        }
        let Some(transport) = &self.transport else {
            return SendOutcome::Rejected(RejectReason::NotConnected);
        };
        if !transport.is_writable().await {
            return SendOutcome::Rejected(RejectReason::NotWritable);
        }

        let signal = Signal::new(message, category);
        let text = match signal.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Could not encode signal");
                return SendOutcome::Rejected(RejectReason::NotWritable);
            }
        };
        match transport.send(text).await {
            Ok(()) => SendOutcome::Sent(signal),
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Data channel refused signal");
                SendOutcome::Rejected(RejectReason::NotWritable)
            }
        }
    }

    /// Close the transport before the driver exits.
    pub(crate) async fn shutdown(&mut self) {
        self.drop_transport().await;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn new_transport(&mut self) -> Option<Arc<dyn PeerTransport>> {
        self.generation += 1;
        let sink = TransportSink::new(self.generation, self.transport_tx.clone());
        match self.factory.create(sink).await {
            Ok(transport) => {
                self.transport = Some(Arc::clone(&transport));
                self.remote_described = false;
                Some(transport)
            }
            Err(e) => {
                self.report_failure("create transport", e).await;
                None
            }
        }
    }

    /// Close and forget the current transport.
    async fn drop_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        self.remote_described = false;
        self.deadline = None;
    }

    /// End the current attempt: tear down and land in `Disconnected`.
    async fn abandon(&mut self) {
        self.drop_transport().await;
        self.pending_candidates.clear();
        if self.state.can_transition(NegotiationState::Disconnected) {
            self.transition(NegotiationState::Disconnected).await;
        }
        self.set_status(ConnectionStatus::Disconnected).await;
    }

    async fn expire(&mut self, reason: &str) {
        warn!(endpoint = %self.endpoint, state = %self.state, reason, "Negotiation timed out");
        self.emit(PeerEvent::Error(format!("negotiation timed out: {reason}")))
            .await;
        self.abandon().await;
    }

    /// Log a transport failure. The state is left as is; the deadline, if
    /// armed, still bounds how long we wait.
    async fn report_failure(&mut self, step: &str, error: TransportError) {
        warn!(endpoint = %self.endpoint, step, error = %error, "Transport failure");
        self.emit(PeerEvent::Error(format!("{step} failed: {error}")))
            .await;
    }

    fn send_envelope(&self, envelope: Envelope) {
        if !self.relay_up {
            debug!(endpoint = %self.endpoint, kind = envelope.kind(), "Relay down; dropped");
            return;
        }
        let kind = envelope.kind();
        match envelope.encode() {
            Ok(text) => match self.relay_out.try_send(text) {
                Ok(()) => debug!(endpoint = %self.endpoint, kind, "Envelope queued for relay"),
                Err(e) => warn!(endpoint = %self.endpoint, kind, error = %e, "Not queued"),
            },
            Err(e) => warn!(endpoint = %self.endpoint, kind, error = %e, "Could not encode"),
        }
    }

    async fn transition(&mut self, next: NegotiationState) {
        let from = self.state;
        if !from.can_transition(next) {
            warn!(endpoint = %self.endpoint, %from, to = %next, "Illegal transition ignored");
            return;
        }
        self.state = next;
        info!(endpoint = %self.endpoint, %from, to = %next, "Negotiation state changed");
        self.shared.write().await.state = next;
        self.emit(PeerEvent::StateChanged { from, to: next }).await;
    }

    async fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.shared.write().await.status = status;
        self.emit(PeerEvent::StatusChanged(status)).await;
    }

    async fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event).await;
    }
}
