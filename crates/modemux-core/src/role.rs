// ── Role taxonomy ──
//
// One closed sum type per manager kind, plus a capability predicate.
// The set is fixed by the platform; new roles are an API change, not a
// runtime registration.

use serde::{Deserialize, Serialize};

/// Purpose of a live Client Mode Manager.
///
/// Every role other than `ScanOnly` is connectivity-capable. At most one
/// live manager holds `Primary`, and at most one holds `ScanOnly`; the
/// orchestrator enforces both.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum ClientRole {
    /// Background scanning only; no connections.
    ScanOnly,
    /// The device's primary connectivity interface. Only this role emits
    /// the legacy global connectivity broadcast.
    Primary,
    /// Candidate primary during a make-before-break handover.
    SecondaryTransient,
    /// Long-lived secondary connection (e.g. restricted networking).
    SecondaryLongLived,
    /// Local-only connection with no internet expectation.
    LocalOnly,
}

impl ClientRole {
    /// Whether this role may hold an L2/L3 connection.
    pub fn is_connectivity_capable(self) -> bool {
        !matches!(self, Self::ScanOnly)
    }
}

/// Purpose of a live SoftAp Mode Manager.
///
/// Fixed at construction for the manager's whole life; there is no
/// in-place SoftAp role switch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum SoftApRole {
    /// Internet-sharing hotspot.
    Tethered,
    /// Local-only hotspot (no upstream forwarding).
    LocalOnlyHotspot,
}
