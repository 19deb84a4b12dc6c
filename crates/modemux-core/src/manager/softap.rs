// ── SoftAp Mode Manager ──
//
// Owns one access-point interface. The role is fixed at construction;
// there is no in-place SoftAp role switch. Start runs a typed pipeline
// (MAC policy, country code, channel/band, capability validation) and
// aborts with a SoftApStartFailure without side effects beyond cleanup.
// While started, admission is applied in a fixed priority order:
// blocked list, then allow list, then capacity.

use std::sync::Arc;
use std::time::Duration;

use modemux_hal::{
    ApCapabilities, Band, DisconnectReason, IfaceHandle, InterfaceEventKind, MacAddress, RadioHal,
    Requestor, SecurityType,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SoftApDefaults;
use crate::error::SoftApStartFailure;
use crate::manager::ManagerId;
use crate::role::SoftApRole;

// ── Configuration ───────────────────────────────────────────────────

/// Requested hotspot configuration. Fields left `None` fall back to the
/// device-policy defaults ([`SoftApDefaults`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftApConfig {
    pub ssid: String,
    pub security: SecurityType,
    pub passphrase: Option<String>,
    pub bands: Vec<Band>,
    /// `None` requests automatic channel selection.
    pub channel: Option<u8>,
    pub hidden: bool,
    /// Explicit BSSID; `None` restores the factory MAC.
    pub bssid: Option<MacAddress>,
    /// Mandatory when the 5 GHz band is requested.
    pub country_code: Option<String>,
    pub max_clients: Option<u16>,
    /// Whether the allow list is enforced.
    pub client_control_enabled: bool,
    pub blocked_list: Vec<MacAddress>,
    pub allowed_list: Vec<MacAddress>,
    pub shutdown_timeout_ms: Option<u64>,
    pub shutdown_timeout_enabled: Option<bool>,
}

impl SoftApConfig {
    /// Open 2.4 GHz network with device defaults everywhere else.
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            security: SecurityType::Open,
            passphrase: None,
            bands: vec![Band::Band2GHz],
            channel: None,
            hidden: false,
            bssid: None,
            country_code: None,
            max_clients: None,
            client_control_enabled: false,
            blocked_list: Vec::new(),
            allowed_list: Vec::new(),
            shutdown_timeout_ms: None,
            shutdown_timeout_enabled: None,
        }
    }
}

// ── State / outcomes ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SoftApState {
    Idle,
    Started,
    Stopped,
}

/// Why a station connect attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AdmissionRejection {
    Blocked,
    NotAllowed,
    Capacity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftApOutcome {
    Started,
    StartFailed { failure: SoftApStartFailure },
    Stopped { reason: String },
    StationsChanged { connected: usize },
}

/// Outcomes plus timer requests, scheduled by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftApDirective {
    Outcome(SoftApOutcome),
    ArmIdleTimer {
        generation: u64,
        timeout: Duration,
    },
    /// Invalidate any armed idle timer (generation already bumped).
    CancelIdleTimer,
}

// ── Manager ─────────────────────────────────────────────────────────

pub struct SoftApModeManager {
    id: ManagerId,
    hal: Arc<dyn RadioHal>,
    requestor: Requestor,
    role: SoftApRole,
    config: SoftApConfig,
    defaults: SoftApDefaults,
    state: SoftApState,
    iface: Option<IfaceHandle>,
    capabilities: Option<ApCapabilities>,
    resolved_channel: Option<u8>,
    connected: Vec<MacAddress>,
    timer_generation: u64,
}

impl SoftApModeManager {
    pub fn new(
        id: ManagerId,
        hal: Arc<dyn RadioHal>,
        requestor: Requestor,
        role: SoftApRole,
        config: SoftApConfig,
        defaults: SoftApDefaults,
    ) -> Self {
        Self {
            id,
            hal,
            requestor,
            role,
            config,
            defaults,
            state: SoftApState::Idle,
            iface: None,
            capabilities: None,
            resolved_channel: None,
            connected: Vec::new(),
            timer_generation: 0,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn role(&self) -> SoftApRole {
        self.role
    }

    pub fn state(&self) -> SoftApState {
        self.state
    }

    pub fn iface(&self) -> Option<&IfaceHandle> {
        self.iface.as_ref()
    }

    pub fn requestor(&self) -> &Requestor {
        &self.requestor
    }

    pub fn config(&self) -> &SoftApConfig {
        &self.config
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SoftApState::Stopped
    }

    pub fn owns(&self, handle: &IfaceHandle) -> bool {
        self.iface.as_ref().is_some_and(|h| h.id == handle.id)
    }

    /// `min(hardware capability, configured maximum)`.
    pub fn effective_max_clients(&self) -> u16 {
        let configured = self.config.max_clients.unwrap_or(self.defaults.max_clients);
        let hardware = self
            .capabilities
            .as_ref()
            .map_or(configured, |c| c.max_clients);
        configured.min(hardware)
    }

    pub fn shutdown_timeout_enabled(&self) -> bool {
        self.config
            .shutdown_timeout_enabled
            .unwrap_or(self.defaults.shutdown_timeout_enabled)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.config
            .shutdown_timeout_ms
            .map_or_else(|| self.defaults.shutdown_timeout(), Duration::from_millis)
    }

    // ── Start pipeline ──────────────────────────────────────────────

    /// Bring the AP up. Any pipeline failure tears down whatever was
    /// created and reports `StartFailed` with the typed reason.
    pub fn start(&mut self) -> Vec<SoftApDirective> {
        if self.state != SoftApState::Idle {
            warn!(id = %self.id, state = %self.state, "start ignored");
            return Vec::new();
        }
        match self.bring_up() {
            Ok(()) => {
                self.state = SoftApState::Started;
                info!(id = %self.id, role = %self.role, ssid = %self.config.ssid,
                      channel = ?self.resolved_channel, "soft AP started");
                let mut out = vec![SoftApDirective::Outcome(SoftApOutcome::Started)];
                // No stations yet: the idle timer starts armed.
                out.extend(self.rearm_idle_timer());
                out
            }
            Err(failure) => {
                self.cleanup();
                self.state = SoftApState::Stopped;
                warn!(id = %self.id, %failure, "soft AP start failed");
                vec![SoftApDirective::Outcome(SoftApOutcome::StartFailed {
                    failure,
                })]
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), SoftApStartFailure> {
        let iface = self
            .hal
            .create_ap_interface(&self.requestor)
            .map_err(|e| SoftApStartFailure::InterfaceCreation {
                reason: e.to_string(),
            })?;
        let caps = self
            .hal
            .ap_capabilities(&iface)
            .map_err(|e| SoftApStartFailure::InterfaceCreation {
                reason: e.to_string(),
            })?;
        self.iface = Some(iface.clone());

        // MAC policy: explicit BSSID must apply; factory restore is a
        // soft failure.
        match self.config.bssid.as_ref() {
            Some(bssid) => {
                self.hal
                    .set_mac_address(&iface, Some(bssid))
                    .map_err(|e| SoftApStartFailure::MacPolicy {
                        reason: e.to_string(),
                    })?;
            }
            None => {
                if let Err(e) = self.hal.set_mac_address(&iface, None) {
                    warn!(id = %self.id, error = %e, "factory MAC restore failed (continuing)");
                }
            }
        }

        // Country code: mandatory for 5 GHz, optional otherwise.
        let wants_5ghz = self.config.bands.contains(&Band::Band5GHz);
        match self.config.country_code.as_deref() {
            Some(code) => {
                self.hal
                    .set_country_code(&iface, code)
                    .map_err(|_| SoftApStartFailure::CountryCode { code: code.into() })?;
            }
            None if wants_5ghz => {
                return Err(SoftApStartFailure::CountryCodeRequired {
                    band: Band::Band5GHz,
                });
            }
            None => {}
        }

        // Channel/band resolution against capability + ACS.
        for band in &self.config.bands {
            if !caps.bands.contains(band) {
                return Err(SoftApStartFailure::UnsupportedBand { requested: *band });
            }
        }
        self.resolved_channel = match self.config.channel {
            Some(ch) => Some(ch),
            None if caps.supports_acs => None, // driver picks
            None if self.config.bands.contains(&Band::Band2GHz) => Some(6),
            None => return Err(SoftApStartFailure::ChannelPolicy),
        };

        // Capability validation.
        if !caps.supported_security.contains(&self.config.security) {
            return Err(SoftApStartFailure::UnsupportedSecurity {
                requested: self.config.security,
            });
        }
        if self.config.hidden && !caps.supports_hidden_ssid {
            return Err(SoftApStartFailure::HiddenSsidUnsupported);
        }
        if self.config.max_clients == Some(0) {
            return Err(SoftApStartFailure::TooManyClientsRequested {
                requested: 0,
                capability: caps.max_clients,
            });
        }

        self.capabilities = Some(caps);
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(iface) = self.iface.take() {
            if let Err(e) = self.hal.teardown_interface(&iface) {
                warn!(id = %self.id, %iface, error = %e, "cleanup teardown failed");
            }
        }
        self.capabilities = None;
        self.resolved_channel = None;
    }

    // ── Stop ────────────────────────────────────────────────────────

    pub fn stop(&mut self, reason: impl Into<String>) -> Vec<SoftApDirective> {
        let reason = reason.into();
        match self.state {
            SoftApState::Stopped => Vec::new(),
            SoftApState::Idle | SoftApState::Started => {
                self.cleanup();
                self.connected.clear();
                self.state = SoftApState::Stopped;
                self.timer_generation += 1;
                info!(id = %self.id, %reason, "soft AP stopped");
                vec![
                    SoftApDirective::CancelIdleTimer,
                    SoftApDirective::Outcome(SoftApOutcome::Stopped { reason }),
                ]
            }
        }
    }

    // ── Station admission ───────────────────────────────────────────

    /// Admission verdict in priority order: blocked list, allow list
    /// (when client control is on), capacity. The same order is used for
    /// initial admission and for re-checks after a config update.
    fn admission_verdict(
        config: &SoftApConfig,
        limit: u16,
        already_connected: usize,
        mac: &MacAddress,
    ) -> Result<(), AdmissionRejection> {
        if config.blocked_list.contains(mac) {
            return Err(AdmissionRejection::Blocked);
        }
        if config.client_control_enabled && !config.allowed_list.contains(mac) {
            return Err(AdmissionRejection::NotAllowed);
        }
        if already_connected >= usize::from(limit) {
            return Err(AdmissionRejection::Capacity);
        }
        Ok(())
    }

    /// A station associated with the AP.
    pub fn station_connected(&mut self, mac: MacAddress) -> Vec<SoftApDirective> {
        if self.state != SoftApState::Started || self.connected.contains(&mac) {
            return Vec::new();
        }
        let limit = self.effective_max_clients();
        match Self::admission_verdict(&self.config, limit, self.connected.len(), &mac) {
            Ok(()) => {
                self.connected.push(mac);
                debug!(id = %self.id, connected = self.connected.len(), "station admitted");
                self.stations_changed(self.connected.len() == 1)
            }
            Err(rejection) => {
                let reason = match rejection {
                    AdmissionRejection::Capacity => DisconnectReason::NoMoreStations,
                    AdmissionRejection::Blocked | AdmissionRejection::NotAllowed => {
                        DisconnectReason::Unspecified
                    }
                };
                debug!(id = %self.id, %mac, %rejection, "station rejected");
                self.force_disconnect(&mac, reason);
                Vec::new()
            }
        }
    }

    /// A station disassociated.
    pub fn station_disconnected(&mut self, mac: &MacAddress) -> Vec<SoftApDirective> {
        if self.state != SoftApState::Started {
            return Vec::new();
        }
        let before = self.connected.len();
        self.connected.retain(|m| m != mac);
        if self.connected.len() == before {
            return Vec::new();
        }
        self.stations_changed(self.connected.is_empty())
    }

    fn stations_changed(&mut self, zero_crossing: bool) -> Vec<SoftApDirective> {
        let mut out = vec![SoftApDirective::Outcome(SoftApOutcome::StationsChanged {
            connected: self.connected.len(),
        })];
        if zero_crossing {
            if self.connected.is_empty() {
                out.extend(self.rearm_idle_timer());
            } else {
                self.timer_generation += 1;
                out.push(SoftApDirective::CancelIdleTimer);
            }
        }
        out
    }

    fn rearm_idle_timer(&mut self) -> Vec<SoftApDirective> {
        if !self.shutdown_timeout_enabled() {
            return Vec::new();
        }
        self.timer_generation += 1;
        vec![SoftApDirective::ArmIdleTimer {
            generation: self.timer_generation,
            timeout: self.shutdown_timeout(),
        }]
    }

    /// The no-station timer fired. Stale generations and non-empty APs
    /// are ignored; otherwise this is equivalent to `stop()`.
    pub fn idle_timer_fired(&mut self, generation: u64) -> Vec<SoftApDirective> {
        if generation != self.timer_generation
            || self.state != SoftApState::Started
            || !self.connected.is_empty()
            || !self.shutdown_timeout_enabled()
        {
            return Vec::new();
        }
        self.stop("no stations connected within timeout")
    }

    fn force_disconnect(&self, mac: &MacAddress, reason: DisconnectReason) {
        let Some(iface) = self.iface.as_ref() else {
            return;
        };
        if let Err(e) = self.hal.force_client_disconnect(iface, mac, reason) {
            warn!(id = %self.id, %mac, error = %e, "force disconnect failed");
        }
    }

    // ── In-place configuration updates ──────────────────────────────

    /// Apply a configuration update without interface teardown when the
    /// change set is restart-safe (client lists, client control,
    /// client ceiling, shutdown timeout). Anything else is logged and
    /// ignored until the caller restarts the AP explicitly.
    pub fn update_config(&mut self, new: SoftApConfig) -> Vec<SoftApDirective> {
        if self.state != SoftApState::Started {
            warn!(id = %self.id, state = %self.state, "config update ignored");
            return Vec::new();
        }
        let restart_needed = new.ssid != self.config.ssid
            || new.security != self.config.security
            || new.passphrase != self.config.passphrase
            || new.bands != self.config.bands
            || new.channel != self.config.channel
            || new.hidden != self.config.hidden
            || new.bssid != self.config.bssid
            || new.country_code != self.config.country_code;
        if restart_needed {
            warn!(id = %self.id, "config update requires restart; ignored");
            return Vec::new();
        }

        let timeout_changed = new.shutdown_timeout_ms != self.config.shutdown_timeout_ms
            || new.shutdown_timeout_enabled != self.config.shutdown_timeout_enabled;
        self.config = new;

        let mut out = self.recheck_admissions();

        if timeout_changed {
            self.timer_generation += 1;
            out.push(SoftApDirective::CancelIdleTimer);
            if self.connected.is_empty() {
                out.extend(self.rearm_idle_timer());
            }
        }
        out
    }

    /// Re-run admission over connected stations after an update, in the
    /// same priority order as initial admission.
    fn recheck_admissions(&mut self) -> Vec<SoftApDirective> {
        let limit = self.effective_max_clients();
        let mut kept: Vec<MacAddress> = Vec::new();
        let mut evicted: Vec<(MacAddress, AdmissionRejection)> = Vec::new();
        for mac in self.connected.clone() {
            match Self::admission_verdict(&self.config, limit, kept.len(), &mac) {
                Ok(()) => kept.push(mac),
                Err(rejection) => evicted.push((mac, rejection)),
            }
        }
        if evicted.is_empty() {
            return Vec::new();
        }
        let was_nonempty = !self.connected.is_empty();
        self.connected = kept;
        for (mac, rejection) in &evicted {
            let reason = match rejection {
                AdmissionRejection::Capacity => DisconnectReason::NoMoreStations,
                AdmissionRejection::Blocked | AdmissionRejection::NotAllowed => {
                    DisconnectReason::Unspecified
                }
            };
            info!(id = %self.id, %mac, %rejection, "station evicted by config update");
            self.force_disconnect(mac, reason);
        }
        self.stations_changed(was_nonempty && self.connected.is_empty())
    }

    // ── Interface events ────────────────────────────────────────────

    pub fn interface_event(&mut self, kind: InterfaceEventKind) -> Vec<SoftApDirective> {
        match kind {
            InterfaceEventKind::Destroyed => {
                self.iface = None; // nothing left to tear down
                self.stop("interface destroyed")
            }
            InterfaceEventKind::Down => {
                warn!(id = %self.id, "AP interface went down");
                self.stop("interface down")
            }
            InterfaceEventKind::Up => Vec::new(),
        }
    }
}
