use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::{ConnectorError, identity::StreamId, source::Source};

/// Client-side lifecycle of one stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Announced; waiting for the engine to open it.
    Joining,
    /// Records may flow.
    Open,
    /// End-of-stream sent; waiting for the matching ack.
    PendingEosAck,
    /// Fully closed and deleted.
    Closed,
}

pub(crate) struct SourceEntry {
    pub source: Box<dyn Source>,
    /// Most recent engine-acknowledged position. Meaningful once `ack_seen`.
    pub acked: u64,
    pub ack_seen: bool,
}

/// Owns every registered source together with the per-stream lifecycle
/// collections. A stream id lives in at most one of joining / open /
/// pending-eos at a time; closed streams keep only their final position.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    sources: IndexMap<StreamId, SourceEntry>,
    joining: HashSet<StreamId>,
    open: HashSet<StreamId>,
    pending_eos_ack: IndexMap<StreamId, u64>,
    closed: IndexMap<StreamId, u64>,
}

impl StreamRegistry {
    pub fn contains(&self, id: StreamId) -> bool {
        self.sources.contains_key(&id)
    }

    pub fn state(&self, id: StreamId) -> Option<StreamState> {
        if self.open.contains(&id) {
            Some(StreamState::Open)
        } else if self.joining.contains(&id) {
            Some(StreamState::Joining)
        } else if self.pending_eos_ack.contains_key(&id) {
            Some(StreamState::PendingEosAck)
        } else if self.closed.contains_key(&id) {
            Some(StreamState::Closed)
        } else {
            None
        }
    }

    /// Registers a source in the joining state.
    pub fn add(&mut self, id: StreamId, source: Box<dyn Source>) {
        let acked = source.point_of_ref();
        self.sources.insert(id, SourceEntry { source, acked, ack_seen: false });
        self.joining.insert(id);
    }

    pub fn entry_mut(&mut self, id: StreamId) -> Option<&mut SourceEntry> {
        self.sources.get_mut(&id)
    }

    pub fn is_open(&self, id: StreamId) -> bool {
        self.open.contains(&id)
    }

    /// Removes the id from joining, reporting whether it was there.
    pub fn take_joining(&mut self, id: StreamId) -> bool {
        self.joining.remove(&id)
    }

    pub fn take_open(&mut self, id: StreamId) -> bool {
        self.open.remove(&id)
    }

    pub fn set_open(&mut self, id: StreamId) {
        self.open.insert(id);
    }

    pub fn set_joining(&mut self, id: StreamId) {
        self.joining.insert(id);
    }

    /// Moves every live stream back to joining, as after a session drop.
    pub fn rejoin_all(&mut self) -> Vec<StreamId> {
        let ids: Vec<StreamId> = self.sources.keys().copied().collect();
        self.open.clear();
        self.pending_eos_ack.clear();
        for id in &ids {
            self.joining.insert(*id);
        }
        ids
    }

    /// Moves an open stream into pending-eos at the given position.
    pub fn begin_eos(&mut self, id: StreamId, por: u64) {
        self.open.remove(&id);
        self.pending_eos_ack.insert(id, por);
    }

    pub fn pending_eos(&self, id: StreamId) -> Option<u64> {
        self.pending_eos_ack.get(&id).copied()
    }

    /// Drops a pending end-of-stream handshake, reporting whether one was
    /// in flight.
    pub fn take_pending_eos(&mut self, id: StreamId) -> Option<u64> {
        self.pending_eos_ack.shift_remove(&id)
    }

    pub fn has_closed(&self, id: StreamId) -> bool {
        self.closed.contains_key(&id)
    }

    pub fn any_closed(&self) -> bool {
        !self.closed.is_empty()
    }

    pub fn closed_por(&self, id: StreamId) -> Option<u64> {
        self.closed.get(&id).copied()
    }

    /// Final step of stream removal: the pending-eos entry must still be
    /// present. Closes the source and archives its last acked position.
    pub fn finalize(&mut self, id: StreamId) -> Result<u64, ConnectorError> {
        if self.pending_eos_ack.shift_remove(&id).is_none() {
            return Err(ConnectorError::NotRemoved(id));
        }
        let Some(mut entry) = self.sources.shift_remove(&id) else {
            return Err(ConnectorError::UnknownStream(id));
        };
        entry.source.close();
        self.closed.insert(id, entry.acked);
        debug!(%id, acked = entry.acked, "source closed and archived");
        Ok(entry.acked)
    }
}
