// ── Command surface ──
//
// Everything an external caller may ask the orchestrator to do. Each
// command travels through the serialized queue as a CommandEnvelope and
// is answered on a oneshot channel; settings toggles are not commands,
// they arrive through the settings store's watch channel.

use tokio::sync::oneshot;

use modemux_hal::Requestor;

use crate::error::CoreError;
use crate::manager::softap::SoftApConfig;
use crate::manager::ManagerId;
use crate::orchestrator::DumpReport;
use crate::role::{ClientRole, SoftApRole};

/// Which SoftAp managers a stop request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftApStopScope {
    Tethered,
    LocalOnlyHotspot,
    All,
}

#[derive(Debug)]
pub enum Command {
    // ── Emergency overlay ────────────────────────────────────────────
    SetEmergencyCallbackMode(bool),
    SetEmergencyCallState(bool),

    // ── SoftAp lifecycle ─────────────────────────────────────────────
    StartSoftAp {
        role: SoftApRole,
        config: SoftApConfig,
        requestor: Requestor,
    },
    StopSoftAp {
        scope: SoftApStopScope,
    },
    /// In-place update of a started SoftAp manager's configuration.
    UpdateSoftApConfig {
        id: ManagerId,
        config: SoftApConfig,
    },

    // ── Client-manager arbitration ───────────────────────────────────
    /// Ask for an extra connectivity manager. Falls back to the existing
    /// primary when the hardware cannot host another station interface.
    RequestAdditionalClientManager {
        role: ClientRole,
        requestor: Requestor,
    },
    ReleaseClientManager {
        id: ManagerId,
    },
    SetClientRole {
        id: ManagerId,
        role: ClientRole,
    },

    // ── Per-connection signals ───────────────────────────────────────
    NotifyL3Validated {
        id: ManagerId,
    },
    SetVowifiActive(bool),

    // ── Recovery ─────────────────────────────────────────────────────
    RecoveryRestart {
        reason: String,
    },
    RecoveryDisable,

    // ── Diagnostics ──────────────────────────────────────────────────
    Dump,
}

/// Successful command outcomes.
#[derive(Debug)]
pub enum CommandResult {
    Ok,
    /// The id of the manager a request resolved to (freshly created or
    /// the existing primary after arbitration fallback).
    Manager(ManagerId),
    Dump(DumpReport),
}

pub struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
}
