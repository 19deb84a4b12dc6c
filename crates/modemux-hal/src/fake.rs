// ── FakeRadio ──
//
// Scriptable in-memory RadioHal used by the core's tests and the demo
// binary. Mirrors the real contract: creation mints handles, teardown
// retires them, capability queries are budget-based, and asynchronous
// events are injected through the same channel a real HAL would use.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::HalError;
use crate::iface::{
    ApCapabilities, Band, DisconnectReason, HalEvent, IfaceHandle, IfaceKind, InterfaceEvent,
    InterfaceEventKind, MacAddress, Requestor, SecurityType,
};
use crate::radio::RadioHal;

/// One recorded `force_client_disconnect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectCall {
    pub iface: u32,
    pub client: MacAddress,
    pub reason: DisconnectReason,
}

#[derive(Debug)]
struct FakeState {
    next_id: u32,
    live: HashMap<u32, IfaceHandle>,
    up: HashMap<u32, bool>,

    // Budgets consulted by the capability queries.
    max_stations: usize,
    max_aps: usize,

    // Failure injection.
    fail_next_station_create: bool,
    fail_next_ap_create: bool,
    fail_set_mac: bool,
    fail_country_code: bool,

    ap_capabilities: ApCapabilities,

    // Call recording.
    disconnects: Vec<DisconnectCall>,
    teardowns: Vec<IfaceHandle>,
    mac_calls: Vec<(u32, Option<MacAddress>)>,
    country_codes: Vec<(u32, String)>,
    mode_switches: Vec<(u32, &'static str)>,
}

/// In-memory [`RadioHal`] with failure injection and call recording.
pub struct FakeRadio {
    state: Mutex<FakeState>,
    events: mpsc::UnboundedSender<HalEvent>,
}

impl FakeRadio {
    /// Create a fake radio and the event receiver the core should drain.
    ///
    /// Defaults: two concurrent stations, one AP, a 10-client AP
    /// capability with WPA2/WPA3 and hidden-SSID support.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fake = Self {
            state: Mutex::new(FakeState {
                next_id: 0,
                live: HashMap::new(),
                up: HashMap::new(),
                max_stations: 2,
                max_aps: 1,
                fail_next_station_create: false,
                fail_next_ap_create: false,
                fail_set_mac: false,
                fail_country_code: false,
                ap_capabilities: ApCapabilities {
                    max_clients: 10,
                    supported_security: vec![
                        SecurityType::Open,
                        SecurityType::Wpa2Psk,
                        SecurityType::Wpa3Sae,
                    ],
                    supports_hidden_ssid: true,
                    supports_acs: true,
                    bands: vec![Band::Band2GHz, Band::Band5GHz],
                },
                disconnects: Vec::new(),
                teardowns: Vec::new(),
                mac_calls: Vec::new(),
                country_codes: Vec::new(),
                mode_switches: Vec::new(),
            }),
            events: tx,
        };
        (fake, rx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A poisoned fake only happens when a test already panicked.
        match self.state.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    // ── Scripting ───────────────────────────────────────────────────

    /// Limit how many station interfaces may exist at once.
    pub fn set_station_budget(&self, n: usize) {
        self.lock().max_stations = n;
    }

    pub fn set_ap_budget(&self, n: usize) {
        self.lock().max_aps = n;
    }

    /// Make the next station-interface creation fail.
    pub fn fail_next_station_create(&self) {
        self.lock().fail_next_station_create = true;
    }

    pub fn fail_next_ap_create(&self) {
        self.lock().fail_next_ap_create = true;
    }

    /// Reject all MAC programming until cleared.
    pub fn reject_mac_programming(&self, on: bool) {
        self.lock().fail_set_mac = on;
    }

    pub fn reject_country_code(&self, on: bool) {
        self.lock().fail_country_code = on;
    }

    pub fn set_ap_capabilities(&self, caps: ApCapabilities) {
        self.lock().ap_capabilities = caps;
    }

    // ── Event injection ─────────────────────────────────────────────

    /// Deliver a spontaneous interface event, as the firmware would.
    /// The tracked link state follows the event.
    pub fn inject_interface_event(&self, handle: &IfaceHandle, kind: InterfaceEventKind) {
        {
            let mut st = self.lock();
            match kind {
                InterfaceEventKind::Up => {
                    st.up.insert(handle.id, true);
                }
                InterfaceEventKind::Down => {
                    st.up.insert(handle.id, false);
                }
                InterfaceEventKind::Destroyed => {
                    st.live.remove(&handle.id);
                    st.up.remove(&handle.id);
                }
            }
        }
        let _ = self.events.send(HalEvent::Interface(InterfaceEvent {
            handle: handle.clone(),
            kind,
        }));
    }

    /// Report a station joining or leaving an AP interface.
    pub fn inject_ap_station(&self, handle: &IfaceHandle, mac: MacAddress, connected: bool) {
        let _ = self.events.send(HalEvent::ApStation {
            handle: handle.clone(),
            mac,
            connected,
        });
    }

    /// Kill the fake daemon: all handles die, then `DaemonDeath` fires.
    pub fn inject_daemon_death(&self) {
        let mut st = self.lock();
        st.live.clear();
        st.up.clear();
        drop(st);
        let _ = self.events.send(HalEvent::DaemonDeath);
    }

    // ── Recordings ──────────────────────────────────────────────────

    pub fn disconnect_calls(&self) -> Vec<DisconnectCall> {
        self.lock().disconnects.clone()
    }

    pub fn teardown_calls(&self) -> Vec<IfaceHandle> {
        self.lock().teardowns.clone()
    }

    pub fn mode_switches(&self) -> Vec<(u32, &'static str)> {
        self.lock().mode_switches.clone()
    }

    pub fn country_code_calls(&self) -> Vec<(u32, String)> {
        self.lock().country_codes.clone()
    }

    pub fn mac_calls(&self) -> Vec<(u32, Option<MacAddress>)> {
        self.lock().mac_calls.clone()
    }

    /// Number of currently live interfaces of the given kind.
    pub fn live_count(&self, kind: IfaceKind) -> usize {
        self.lock().live.values().filter(|h| h.kind == kind).count()
    }

    fn create(&self, kind: IfaceKind, requestor: &Requestor) -> Result<IfaceHandle, HalError> {
        let mut st = self.lock();
        let (fail, budget, prefix) = match kind {
            IfaceKind::Station => {
                let f = std::mem::take(&mut st.fail_next_station_create);
                (f, st.max_stations, "wlan")
            }
            IfaceKind::Ap => {
                let f = std::mem::take(&mut st.fail_next_ap_create);
                (f, st.max_aps, "ap")
            }
        };
        if fail {
            return Err(HalError::CreationFailed {
                kind,
                reason: "injected failure".into(),
            });
        }
        let existing = st.live.values().filter(|h| h.kind == kind).count();
        if existing >= budget {
            return Err(HalError::CreationFailed {
                kind,
                reason: format!("budget exhausted ({existing}/{budget})"),
            });
        }
        let id = st.next_id;
        st.next_id += 1;
        let handle = IfaceHandle {
            id,
            name: format!("{prefix}{id}"),
            kind,
        };
        st.live.insert(id, handle.clone());
        st.up.insert(id, true);
        debug!(%handle, requestor = %requestor.tag, "fake: interface created");
        Ok(handle)
    }

    fn require_live(st: &FakeState, handle: &IfaceHandle) -> Result<(), HalError> {
        if st.live.contains_key(&handle.id) {
            Ok(())
        } else {
            Err(HalError::UnknownInterface {
                name: handle.name.clone(),
            })
        }
    }
}

impl RadioHal for FakeRadio {
    fn create_station_interface(&self, requestor: &Requestor) -> Result<IfaceHandle, HalError> {
        self.create(IfaceKind::Station, requestor)
    }

    fn create_ap_interface(&self, requestor: &Requestor) -> Result<IfaceHandle, HalError> {
        self.create(IfaceKind::Ap, requestor)
    }

    fn teardown_interface(&self, handle: &IfaceHandle) -> Result<(), HalError> {
        let mut st = self.lock();
        Self::require_live(&st, handle)?;
        st.live.remove(&handle.id);
        st.up.remove(&handle.id);
        st.teardowns.push(handle.clone());
        debug!(%handle, "fake: interface torn down");
        Ok(())
    }

    fn switch_to_scan_only(&self, handle: &IfaceHandle) -> Result<(), HalError> {
        let mut st = self.lock();
        Self::require_live(&st, handle)?;
        st.mode_switches.push((handle.id, "scan_only"));
        Ok(())
    }

    fn switch_to_connectivity(&self, handle: &IfaceHandle) -> Result<(), HalError> {
        let mut st = self.lock();
        Self::require_live(&st, handle)?;
        st.mode_switches.push((handle.id, "connectivity"));
        Ok(())
    }

    fn is_interface_up(&self, handle: &IfaceHandle) -> Result<bool, HalError> {
        let st = self.lock();
        Self::require_live(&st, handle)?;
        Ok(*st.up.get(&handle.id).unwrap_or(&false))
    }

    fn set_mac_address(
        &self,
        handle: &IfaceHandle,
        mac: Option<&MacAddress>,
    ) -> Result<(), HalError> {
        let mut st = self.lock();
        Self::require_live(&st, handle)?;
        if st.fail_set_mac {
            return Err(HalError::MacRejected {
                reason: "injected failure".into(),
            });
        }
        st.mac_calls.push((handle.id, mac.cloned()));
        Ok(())
    }

    fn set_country_code(&self, handle: &IfaceHandle, code: &str) -> Result<(), HalError> {
        let mut st = self.lock();
        Self::require_live(&st, handle)?;
        if st.fail_country_code {
            return Err(HalError::CountryCodeRejected { code: code.into() });
        }
        st.country_codes.push((handle.id, code.to_owned()));
        Ok(())
    }

    fn force_client_disconnect(
        &self,
        handle: &IfaceHandle,
        client: &MacAddress,
        reason: DisconnectReason,
    ) -> Result<(), HalError> {
        let mut st = self.lock();
        Self::require_live(&st, handle)?;
        st.disconnects.push(DisconnectCall {
            iface: handle.id,
            client: client.clone(),
            reason,
        });
        Ok(())
    }

    fn ap_capabilities(&self, handle: &IfaceHandle) -> Result<ApCapabilities, HalError> {
        let st = self.lock();
        Self::require_live(&st, handle)?;
        Ok(st.ap_capabilities.clone())
    }

    fn can_create_additional_station_interface(&self, _requestor: &Requestor) -> bool {
        let st = self.lock();
        st.live.values().filter(|h| h.kind == IfaceKind::Station).count() < st.max_stations
    }

    fn can_create_ap_interface(&self, _requestor: &Requestor) -> bool {
        let st = self.lock();
        st.live.values().filter(|h| h.kind == IfaceKind::Ap).count() < st.max_aps
    }
}
