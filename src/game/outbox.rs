//! Outbound message fan-out to connections and bot drivers

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::ws::protocol::{ParticipantId, ServerMsg};

/// Registry of per-participant outbound channels.
///
/// Socket writer tasks and bot driver tasks own the receiving ends; the
/// session only ever pushes into the senders, which never blocks.
#[derive(Clone, Default)]
pub struct Outbox {
    conns: Arc<DashMap<ParticipantId, mpsc::UnboundedSender<ServerMsg>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection (or bot) and get its message stream
    pub fn register(&self, id: ParticipantId) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.conns.insert(id, tx);
        rx
    }

    /// Drop a connection; its receiver observes the channel closing
    pub fn unregister(&self, id: ParticipantId) {
        self.conns.remove(&id);
    }

    pub fn is_registered(&self, id: ParticipantId) -> bool {
        self.conns.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Send to one participant; returns false if it is gone
    pub fn send_to(&self, id: ParticipantId, msg: ServerMsg) -> bool {
        match self.conns.get(&id) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!(participant_id = id, "Outbound channel closed");
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Send to every registered connection
    pub fn broadcast(&self, msg: ServerMsg) {
        for entry in self.conns.iter() {
            if entry.value().send(msg.clone()).is_err() {
                debug!(participant_id = *entry.key(), "Outbound channel closed");
            }
        }
    }
}

/// Hands out participant ids shared by connections and bots
#[derive(Clone, Default)]
pub struct IdAllocator {
    next: Arc<AtomicU32>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ParticipantId {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}
