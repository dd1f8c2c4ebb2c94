//! Connection registry: every live member of the relay and its outbound queue.

use std::collections::HashMap;
use std::sync::Arc;

use flare_common::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

/// One frame on its way to a member, in the form it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(t) => t.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Members the frame was queued for.
    pub delivered: usize,
    /// Members whose queue was full; they miss this frame.
    pub dropped: usize,
    /// Members whose writer is already gone.
    pub closed: usize,
}

/// Thread-safe set of relay members.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    members: Arc<RwLock<HashMap<ConnectionId, mpsc::Sender<Frame>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member and return its identity.
    pub async fn register(&self, tx: mpsc::Sender<Frame>) -> ConnectionId {
        let id = ConnectionId::next();
        self.members.write().await.insert(id, tx);
        id
    }

    /// Remove a member. Returns false if it was already gone.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        self.members.write().await.remove(&id).is_some()
    }

    /// Queue `frame` for every member except `from`.
    ///
    /// Never blocks on a slow member: a full queue drops the frame for that
    /// member only.
    pub async fn broadcast(&self, from: ConnectionId, frame: Frame) -> Fanout {
        let members = self.members.read().await;
        let mut fanout = Fanout::default();

        for (id, tx) in members.iter() {
            if *id == from {
                continue;
            }
            match tx.try_send(frame.clone()) {
                Ok(()) => fanout.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(conn = %id, "Outbound queue full, dropping frame");
                    fanout.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => fanout.closed += 1,
            }
        }

        fanout
    }

    /// Number of registered members.
    pub async fn count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.members.read().await.contains_key(&id)
    }

    /// Drop every member's queue so their writers close the sockets.
    pub async fn close_all(&self) -> usize {
        let mut members = self.members.write().await;
        let n = members.len();
        members.clear();
        n
    }
}
