// ── Manager graveyard ──
//
// Bounded retention of recently stopped managers, one ring per kind.
// Diagnostics only: nothing in the lifecycle logic reads it back.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::manager::{ManagerId, ManagerKind};

/// Post-mortem record of one stopped manager.
#[derive(Debug, Clone, Serialize)]
pub struct Tombstone {
    pub id: ManagerId,
    pub kind: ManagerKind,
    /// Final role, as displayed (roles differ per kind).
    pub role: Option<String>,
    pub stop_reason: String,
    pub buried_at: DateTime<Utc>,
}

impl Tombstone {
    pub fn new(
        id: ManagerId,
        kind: ManagerKind,
        role: Option<String>,
        stop_reason: impl Into<String>,
    ) -> Self {
        Self {
            id,
            kind,
            role,
            stop_reason: stop_reason.into(),
            buried_at: Utc::now(),
        }
    }
}

/// Ring buffers retaining the last `depth` tombstones per manager kind.
#[derive(Debug)]
pub struct Graveyard {
    depth: usize,
    clients: VecDeque<Tombstone>,
    softaps: VecDeque<Tombstone>,
}

impl Graveyard {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            clients: VecDeque::with_capacity(depth),
            softaps: VecDeque::with_capacity(depth),
        }
    }

    /// Retain the record, evicting the oldest of its kind when full.
    pub fn bury(&mut self, tombstone: Tombstone) {
        let ring = match tombstone.kind {
            ManagerKind::Client => &mut self.clients,
            ManagerKind::SoftAp => &mut self.softaps,
        };
        if self.depth == 0 {
            return;
        }
        if ring.len() == self.depth {
            ring.pop_front();
        }
        ring.push_back(tombstone);
    }

    /// All retained records, clients first, oldest first within a kind.
    pub fn records(&self) -> impl Iterator<Item = &Tombstone> {
        self.clients.iter().chain(self.softaps.iter())
    }

    pub fn len(&self) -> usize {
        self.clients.len() + self.softaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client_stone(n: u64) -> Tombstone {
        Tombstone::new(ManagerId(n), ManagerKind::Client, None, "test")
    }

    #[test]
    fn evicts_oldest_of_same_kind() {
        let mut g = Graveyard::new(2);
        g.bury(client_stone(1));
        g.bury(client_stone(2));
        g.bury(client_stone(3));
        let ids: Vec<u64> = g.records().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn kinds_have_independent_rings() {
        let mut g = Graveyard::new(1);
        g.bury(client_stone(1));
        g.bury(Tombstone::new(
            ManagerId(2),
            ManagerKind::SoftAp,
            Some("Tethered".into()),
            "test",
        ));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn zero_depth_retains_nothing() {
        let mut g = Graveyard::new(0);
        g.bury(client_stone(1));
        assert!(g.is_empty());
    }
}
