// ── Connectivity engine handle ──
//
// Stand-in for the per-interface network-selection/connection engine.
// Selection logic itself is an external collaborator; the core only owns
// the engine's lifetime, which is tied exactly to the Connect substate
// of a client manager.

use modemux_hal::IfaceHandle;
use tracing::debug;

/// Per-interface connectivity engine. Exists if and only if the owning
/// client manager is in `Started/Connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityEngine {
    iface: IfaceHandle,
    l3_validated: bool,
}

impl ConnectivityEngine {
    pub fn start(iface: IfaceHandle) -> Self {
        debug!(%iface, "connectivity engine started");
        Self {
            iface,
            l3_validated: false,
        }
    }

    pub fn iface(&self) -> &IfaceHandle {
        &self.iface
    }

    /// Record that the engine's connection passed L3 validation.
    pub fn mark_l3_validated(&mut self) {
        self.l3_validated = true;
    }

    pub fn is_l3_validated(&self) -> bool {
        self.l3_validated
    }

    /// Tear the engine down. Consumes self so a stopped engine cannot be
    /// referenced again; the caller clears its slot.
    pub fn stop(self) {
        debug!(iface = %self.iface, "connectivity engine stopped");
    }
}
