use tracing::warn;

use crate::identity::StreamId;

/// Round-robin rotation over the registered stream ids.
///
/// Every `advance` moves the cursor exactly one step, whether or not the
/// stream it lands on produces anything, so no perpetually-ready stream can
/// starve another. Removal splices the id out and pulls the cursor back when
/// needed so the next step lands on the id that followed the removed one.
pub(crate) struct RoundRobin {
    keys: Vec<StreamId>,
    idx: isize,
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self { keys: Vec::new(), idx: -1 }
    }
}

impl RoundRobin {
    pub fn insert(&mut self, id: StreamId) {
        self.keys.push(id);
    }

    pub fn remove(&mut self, id: StreamId) -> bool {
        let Some(pos) = self.keys.iter().position(|k| *k == id) else {
            warn!(%id, "stream not in the rotation");
            return false;
        };
        self.keys.remove(pos);
        if self.idx >= pos as isize {
            self.idx -= 1;
        }
        true
    }

    /// Steps the cursor and returns the id it lands on.
    pub fn advance(&mut self) -> Option<StreamId> {
        if self.keys.is_empty() {
            self.idx = -1;
            return None;
        }
        self.idx = (self.idx + 1) % self.keys.len() as isize;
        Some(self.keys[self.idx as usize])
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}
