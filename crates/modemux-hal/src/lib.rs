//! Radio/firmware abstraction boundary for the modemux workspace.
//!
//! This crate defines the narrow surface through which the mode-lifecycle
//! core talks to the device's radio layer:
//!
//! - **[`RadioHal`]** — the trait the core consumes. Every method is a
//!   bounded, non-blocking call (the vendor contract); anything slower on a
//!   real device must be wrapped so the call returns once the request is
//!   accepted. Asynchronous interface events come back over the
//!   [`HalEvent`] channel registered at construction time.
//!
//! - **Identity types** — [`IfaceHandle`], [`IfaceKind`], [`MacAddress`],
//!   and the opaque [`Requestor`] priority token that the capability
//!   queries arbitrate on. The core threads `Requestor` through without
//!   inspecting it.
//!
//! - **[`FakeRadio`]** — an in-memory implementation with failure injection
//!   and call recording, used by the core's tests and the demo binary.

pub mod error;
pub mod fake;
pub mod iface;
pub mod radio;

pub use error::HalError;
pub use fake::FakeRadio;
pub use iface::{
    ApCapabilities, Band, DisconnectReason, HalEvent, IfaceHandle, IfaceKind, InterfaceEvent,
    InterfaceEventKind, MacAddress, Requestor, RequestorPriority, SecurityType,
};
pub use radio::RadioHal;
