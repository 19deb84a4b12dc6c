// ── Mode Managers ──
//
// One manager owns one hardware interface for its whole life. The
// orchestrator creates managers, routes messages to them on its
// serialized queue, and buries them in the graveyard once they stop.

pub mod client;
pub mod engine;
pub mod softap;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a Mode Manager, minted by the orchestrator. Never reused
/// within one orchestrator lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ManagerId(pub u64);

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mm{}", self.0)
    }
}

/// Which kind of manager an id refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum ManagerKind {
    Client,
    SoftAp,
}
