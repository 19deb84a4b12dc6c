// ── Broadcast Queue ──
//
// Role-scoped buffering for legacy notifications. Only a Primary manager
// may notify immediately; everyone else's broadcasts sit in a per-manager
// FIFO until the manager is promoted (flushed exactly once) or removed
// (discarded unexecuted).

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::events::LegacyBroadcast;
use crate::manager::ManagerId;

#[derive(Debug, Default)]
pub struct BroadcastQueue {
    queues: HashMap<ManagerId, VecDeque<LegacyBroadcast>>,
}

impl BroadcastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one notification. Returns the broadcasts to deliver now, in
    /// order. For a primary manager that is any backlog followed by the
    /// new entry; for anyone else nothing is delivered and the entry is
    /// buffered.
    pub fn enqueue_or_send(
        &mut self,
        id: ManagerId,
        is_primary: bool,
        broadcast: LegacyBroadcast,
    ) -> Vec<LegacyBroadcast> {
        if is_primary {
            let mut out = self.drain(id);
            out.push(broadcast);
            out
        } else {
            debug!(%id, ?broadcast, "broadcast buffered (non-primary)");
            self.queues.entry(id).or_default().push_back(broadcast);
            Vec::new()
        }
    }

    /// The manager became primary: its backlog is delivered FIFO, once.
    pub fn flush_on_promotion(&mut self, id: ManagerId) -> Vec<LegacyBroadcast> {
        let out = self.drain(id);
        if !out.is_empty() {
            debug!(%id, count = out.len(), "flushing buffered broadcasts on promotion");
        }
        out
    }

    /// The manager left the live set: its backlog dies with it.
    pub fn discard(&mut self, id: ManagerId) {
        if let Some(q) = self.queues.remove(&id)
            && !q.is_empty()
        {
            debug!(%id, count = q.len(), "discarding buffered broadcasts");
        }
    }

    pub fn buffered(&self, id: ManagerId) -> usize {
        self.queues.get(&id).map_or(0, VecDeque::len)
    }

    fn drain(&mut self, id: ManagerId) -> Vec<LegacyBroadcast> {
        self.queues
            .remove(&id)
            .map(Vec::from)
            .unwrap_or_default()
    }
}
