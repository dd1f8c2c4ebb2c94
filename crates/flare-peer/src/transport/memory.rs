//! In-process transport: two endpoints in one process pair through a
//! shared [`MemoryNetwork`] instead of ICE.
//!
//! Descriptions and candidates are tiny tokens naming the node that made
//! them, so they travel through the relay exactly like real SDP. The
//! channel opens once the offerer has applied the answer and each side has
//! applied at least one remote candidate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flare_common::{IceCandidate, SdpKind, SessionDescription, TransportError};
use tokio::sync::Mutex;

use super::{PeerTransport, TransportEvent, TransportFactory, TransportSink};

const OFFER_PREFIX: &str = "memory-offer:";
const ANSWER_PREFIX: &str = "memory-answer:";
const CANDIDATE_PREFIX: &str = "candidate:memory ";

#[derive(Debug)]
struct Node {
    sink: TransportSink,
    remote: Option<u64>,
    /// Set on the offering side once the answer is applied.
    answer_applied: bool,
    remote_candidate: bool,
    open: bool,
    closed: bool,
}

impl Node {
    fn new(sink: TransportSink) -> Self {
        Self {
            sink,
            remote: None,
            answer_applied: false,
            remote_candidate: false,
            open: false,
            closed: false,
        }
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    nodes: HashMap<u64, Node>,
    next_id: u64,
}

impl NetworkState {
    fn live(&mut self, id: u64) -> Result<&mut Node, TransportError> {
        match self.nodes.get_mut(&id) {
            Some(node) if !node.closed => Ok(node),
            _ => Err(TransportError::Closed),
        }
    }

    /// Open the pair containing `id` if every condition holds.
    fn try_open(&mut self, id: u64) {
        let Some(remote) = self.nodes.get(&id).and_then(|n| n.remote) else {
            return;
        };
        let (Some(a), Some(b)) = (self.nodes.get(&id), self.nodes.get(&remote)) else {
            return;
        };
        if a.open || a.closed || b.closed || b.remote != Some(id) {
            return;
        }
        let offerer_done = a.answer_applied || b.answer_applied;
        if !(offerer_done && a.remote_candidate && b.remote_candidate) {
            return;
        }

        for node_id in [id, remote] {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.open = true;
                node.sink.emit(TransportEvent::ChannelOpen);
            }
        }
        tracing::debug!(a = id, b = remote, "Memory channel open");
    }
}

/// A shared switchboard connecting [`MemoryTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports created so far and not yet closed.
    pub async fn live_nodes(&self) -> usize {
        self.state
            .lock()
            .await
            .nodes
            .values()
            .filter(|n| !n.closed)
            .count()
    }
}

#[async_trait]
impl TransportFactory for MemoryNetwork {
    async fn create(&self, sink: TransportSink) -> Result<Arc<dyn PeerTransport>, TransportError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.nodes.insert(id, Node::new(sink));
        Ok(Arc::new(MemoryTransport {
            id,
            network: self.clone(),
        }))
    }
}

/// One endpoint's view of a [`MemoryNetwork`] pairing.
#[derive(Debug)]
pub struct MemoryTransport {
    id: u64,
    network: MemoryNetwork,
}

fn parse_token(text: &str, prefix: &str) -> Option<u64> {
    text.strip_prefix(prefix)?.trim().parse().ok()
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let mut state = self.network.state.lock().await;
        let node = state.live(self.id)?;
        node.sink
            .emit(TransportEvent::LocalCandidate(IceCandidate::new(format!(
                "{CANDIDATE_PREFIX}{}",
                self.id
            ))));
        Ok(SessionDescription::offer(format!("{OFFER_PREFIX}{}", self.id)))
    }

    async fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        let offerer = match offer.kind {
            SdpKind::Offer => parse_token(&offer.sdp, OFFER_PREFIX),
            _ => None,
        }
        .ok_or_else(|| TransportError::Description(format!("not a memory offer: {}", offer.sdp)))?;

        let mut state = self.network.state.lock().await;
        if state.live(offerer).is_err() {
            return Err(TransportError::Description(format!(
                "offering node {offerer} is gone"
            )));
        }
        let node = state.live(self.id)?;
        node.remote = Some(offerer);
        node.sink
            .emit(TransportEvent::LocalCandidate(IceCandidate::new(format!(
                "{CANDIDATE_PREFIX}{}",
                self.id
            ))));
        Ok(SessionDescription::answer(format!("{ANSWER_PREFIX}{}", self.id)))
    }

    async fn accept_answer(&self, answer: SessionDescription) -> Result<(), TransportError> {
        let answerer = match answer.kind {
            SdpKind::Answer => parse_token(&answer.sdp, ANSWER_PREFIX),
            _ => None,
        }
        .ok_or_else(|| {
            TransportError::Description(format!("not a memory answer: {}", answer.sdp))
        })?;

        let mut state = self.network.state.lock().await;
        let answered_us = state
            .nodes
            .get(&answerer)
            .is_some_and(|n| !n.closed && n.remote == Some(self.id));
        if !answered_us {
            return Err(TransportError::Description(format!(
                "answer from node {answerer} does not match our offer"
            )));
        }
        let node = state.live(self.id)?;
        node.remote = Some(answerer);
        node.answer_applied = true;
        state.try_open(self.id);
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let from = parse_token(&candidate.candidate, CANDIDATE_PREFIX).ok_or_else(|| {
            TransportError::Candidate(format!("not a memory candidate: {}", candidate.candidate))
        })?;

        let mut state = self.network.state.lock().await;
        let node = state.live(self.id)?;
        if node.remote != Some(from) {
            return Err(TransportError::Candidate(format!(
                "candidate from node {from} does not belong to this session"
            )));
        }
        node.remote_candidate = true;
        state.try_open(self.id);
        Ok(())
    }

    async fn send(&self, text: String) -> Result<(), TransportError> {
        let mut state = self.network.state.lock().await;
        let node = state.live(self.id)?;
        if !node.open {
            return Err(TransportError::NotWritable);
        }
        let remote = node.remote.ok_or(TransportError::NotWritable)?;
        let peer = state.live(remote)?;
        peer.sink.emit(TransportEvent::Message(text));
        Ok(())
    }

    async fn is_writable(&self) -> bool {
        let state = self.network.state.lock().await;
        state
            .nodes
            .get(&self.id)
            .is_some_and(|n| n.open && !n.closed)
    }

    async fn close(&self) {
        let mut state = self.network.state.lock().await;
        let Some(node) = state.nodes.get_mut(&self.id) else {
            return;
        };
        if node.closed {
            return;
        }
        node.closed = true;
        let was_open = std::mem::replace(&mut node.open, false);
        let remote = node.remote;

        if let (true, Some(remote)) = (was_open, remote) {
            if let Some(peer) = state.nodes.get_mut(&remote) {
                if peer.open {
                    peer.open = false;
                    peer.sink.emit(TransportEvent::ChannelClosed);
                }
            }
        }
        state.nodes.remove(&self.id);
    }
}
