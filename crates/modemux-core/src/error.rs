// ── Core error types ──
//
// User-facing errors from modemux-core. These are NOT HAL-specific --
// consumers never see raw driver rejections directly. The
// `From<HalError>` impl translates radio-layer failures into
// domain-appropriate variants.

use thiserror::Error;

use modemux_hal::{Band, HalError, SecurityType};

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Lifecycle errors ─────────────────────────────────────────────
    /// An interface could not be created or brought up. Terminal for the
    /// attempt; never retried automatically.
    #[error("interface start failed: {reason}")]
    StartFailure { reason: String },

    /// A live interface disappeared underneath its manager.
    #[error("interface lost: {iface}")]
    InterfaceLost { iface: String },

    // ── Request errors ───────────────────────────────────────────────
    /// The requested configuration violates reported capability.
    /// Returned synchronously; no state change.
    #[error("configuration rejected: {0}")]
    ConfigRejected(#[from] SoftApStartFailure),

    #[error("no such manager: {id}")]
    ManagerNotFound { id: u64 },

    #[error("operation not supported: {reason}")]
    Unsupported { reason: String },

    // ── Infrastructure errors ────────────────────────────────────────
    /// The orchestrator's queue is gone; no further commands accepted.
    #[error("orchestrator is shut down")]
    OrchestratorShutdown,
}

impl From<HalError> for CoreError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::CreationFailed { kind, reason } => Self::StartFailure {
                reason: format!("{kind}: {reason}"),
            },
            HalError::UnknownInterface { name } => Self::InterfaceLost { iface: name },
            HalError::MacRejected { reason } => {
                Self::ConfigRejected(SoftApStartFailure::MacPolicy { reason })
            }
            HalError::CountryCodeRejected { code } => {
                Self::ConfigRejected(SoftApStartFailure::CountryCode { code })
            }
            HalError::DriverRejected { op, reason } => Self::StartFailure {
                reason: format!("{op}: {reason}"),
            },
        }
    }
}

// ── SoftAp start failures ────────────────────────────────────────────

/// Typed reason a SoftAp bring-up was aborted. Each maps to one stage of
/// the start pipeline; the manager returns to `Idle` with no side effects
/// beyond best-effort cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoftApStartFailure {
    #[error("MAC address policy failed: {reason}")]
    MacPolicy { reason: String },

    #[error("country code invalid or missing: {code}")]
    CountryCode { code: String },

    /// The 5 GHz band requires a country code.
    #[error("country code required for {band}")]
    CountryCodeRequired { band: Band },

    #[error("no usable channel for the requested bands")]
    ChannelPolicy,

    #[error("security type {requested} not supported by this interface")]
    UnsupportedSecurity { requested: SecurityType },

    #[error("band {requested} not supported by this interface")]
    UnsupportedBand { requested: Band },

    #[error("hidden SSID not supported by this interface")]
    HiddenSsidUnsupported,

    #[error("requested {requested} clients, capability allows {capability}")]
    TooManyClientsRequested { requested: u16, capability: u16 },

    #[error("AP interface creation failed: {reason}")]
    InterfaceCreation { reason: String },
}
