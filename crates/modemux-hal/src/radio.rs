// ── RadioHal trait ──
//
// The contract the core consumes. Implementations wrap the vendor HAL /
// supplicant control path. Every method must complete in bounded time
// without blocking on link-layer activity: a successful return means the
// request was accepted, not that the link is up. Link state arrives via
// the HalEvent channel handed to the implementation at construction.

use crate::error::HalError;
use crate::iface::{
    ApCapabilities, DisconnectReason, IfaceHandle, MacAddress, Requestor,
};

/// Radio/firmware abstraction consumed by the mode-lifecycle core.
pub trait RadioHal: Send + Sync {
    /// Create a station (client) interface for the given requestor.
    fn create_station_interface(&self, requestor: &Requestor) -> Result<IfaceHandle, HalError>;

    /// Create an access-point interface for the given requestor.
    fn create_ap_interface(&self, requestor: &Requestor) -> Result<IfaceHandle, HalError>;

    /// Tear the interface down. After this returns the handle is dead;
    /// no `Destroyed` event follows a successful planned teardown.
    fn teardown_interface(&self, handle: &IfaceHandle) -> Result<(), HalError>;

    /// Put a station interface into scan-only mode.
    fn switch_to_scan_only(&self, handle: &IfaceHandle) -> Result<(), HalError>;

    /// Put a station interface into full-connectivity mode.
    fn switch_to_connectivity(&self, handle: &IfaceHandle) -> Result<(), HalError>;

    fn is_interface_up(&self, handle: &IfaceHandle) -> Result<bool, HalError>;

    /// Program a MAC address. `None` restores the factory MAC.
    fn set_mac_address(
        &self,
        handle: &IfaceHandle,
        mac: Option<&MacAddress>,
    ) -> Result<(), HalError>;

    fn set_country_code(&self, handle: &IfaceHandle, code: &str) -> Result<(), HalError>;

    /// Kick a station off an AP interface.
    fn force_client_disconnect(
        &self,
        handle: &IfaceHandle,
        client: &MacAddress,
        reason: DisconnectReason,
    ) -> Result<(), HalError>;

    /// Capability report for a created AP interface.
    fn ap_capabilities(&self, handle: &IfaceHandle) -> Result<ApCapabilities, HalError>;

    // ── Capability arbitration ──────────────────────────────────────
    //
    // Consulted before every creation attempt; results must never be
    // cached past a single decision.

    /// Whether another concurrent station interface can be created for
    /// this requestor without evicting an existing one.
    fn can_create_additional_station_interface(&self, requestor: &Requestor) -> bool;

    /// Whether an AP interface can be created for this requestor.
    fn can_create_ap_interface(&self, requestor: &Requestor) -> bool;
}
