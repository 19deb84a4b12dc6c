// ── HAL error types ──
//
// Failures surfaced by the radio layer. The core translates these into
// its own domain errors -- consumers of modemux-core never see a raw
// HalError.

use thiserror::Error;

use crate::iface::IfaceKind;

/// Unified error type for the radio abstraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// The firmware refused to create another interface of this kind.
    #[error("cannot create {kind} interface: {reason}")]
    CreationFailed { kind: IfaceKind, reason: String },

    /// Operation referenced an interface the radio layer does not know.
    #[error("unknown interface: {name}")]
    UnknownInterface { name: String },

    /// The driver rejected a MAC address change.
    #[error("MAC programming rejected: {reason}")]
    MacRejected { reason: String },

    /// The driver rejected the country code.
    #[error("country code rejected: {code}")]
    CountryCodeRejected { code: String },

    /// Any other per-operation driver rejection.
    #[error("{op} rejected by driver: {reason}")]
    DriverRejected { op: &'static str, reason: String },
}
