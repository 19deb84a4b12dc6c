// ── Event bus payloads ──
//
// Everything the orchestrator publishes. The make-before-break
// coordinator and the broadcast queue consume these in-loop; external
// observers get the same stream over a broadcast channel.

use crate::manager::{ManagerId, ManagerKind};
use crate::orchestrator::OrchestratorState;
use crate::role::ClientRole;

/// Role-scoped external notification. Only a `Primary` client manager
/// fires these immediately; for everyone else they are buffered by the
/// broadcast queue until promotion (or discarded on teardown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyBroadcast {
    /// Global connectivity-state change.
    ConnectivityState {
        connected: bool,
        network: Option<String>,
    },
    /// The primary interface is about to go away (fires before the
    /// deferred-stop window starts tearing things down).
    Disabling,
}

/// Events published on the orchestrator's bus, in the exact order the
/// serialized queue produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeEvent {
    /// A manager entered the live set (its `started` callback fired).
    ManagerAdded {
        id: ManagerId,
        kind: ManagerKind,
    },
    /// A manager left the live set (stopped or failed to start).
    ManagerRemoved {
        id: ManagerId,
        kind: ManagerKind,
    },
    /// A client manager's role changed. `old` is `None` for the first
    /// role assignment after creation.
    ClientRoleChanged {
        id: ManagerId,
        old: Option<ClientRole>,
        new: ClientRole,
    },
    /// The identity of the `Primary` manager changed.
    PrimaryChanged {
        old: Option<ManagerId>,
        new: Option<ManagerId>,
    },
    /// A connectivity-capable client manager passed L3 validation.
    L3Validated { id: ManagerId },
    /// The top-level state machine moved.
    StateChanged(OrchestratorState),
    /// A role-scoped notification was delivered (post buffering rules).
    LegacyBroadcast {
        id: ManagerId,
        broadcast: LegacyBroadcast,
    },
    /// A manager's start attempt failed terminally.
    StartFailed {
        id: ManagerId,
        kind: ManagerKind,
        reason: String,
    },
    /// Connected-station count on a SoftAp manager changed.
    SoftApStationsChanged { id: ManagerId, connected: usize },
}
