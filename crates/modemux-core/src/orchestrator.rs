// ── Orchestrator ──
//
// Top-level mode-lifecycle controller. One run task owns every live
// manager, the graveyard, and both satellites; all mutation happens on
// its serialized queue. External callers talk to it through a cheaply
// cloneable handle that sends CommandEnvelopes and subscribes to the
// event bus.
//
// Ordering invariant: commands, HAL events, timer firings, and settings
// changes are all routed through the same loop, so a manager never sees
// two lifecycle messages concurrently.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modemux_hal::{HalEvent, IfaceHandle, MacAddress, RadioHal, Requestor};

use crate::broadcast::BroadcastQueue;
use crate::command::{Command, CommandEnvelope, CommandResult, SoftApStopScope};
use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::events::ModeEvent;
use crate::graveyard::{Graveyard, Tombstone};
use crate::handover::{HandoverAction, LiveClientView, MakeBeforeBreak};
use crate::manager::client::{ClientDirective, ClientInput, ClientModeManager, ClientOutcome};
use crate::manager::softap::{SoftApConfig, SoftApDirective, SoftApModeManager, SoftApOutcome};
use crate::manager::{ManagerId, ManagerKind};
use crate::role::{ClientRole, SoftApRole};
use crate::settings::{Settings, SettingsStore};

const COMMAND_CHANNEL_SIZE: usize = 64;
const EVENT_CHANNEL_SIZE: usize = 256;

// ── Top-level state ─────────────────────────────────────────────────

/// Steady states of the top state machine. The emergency overlay is
/// orthogonal and visible in the dump, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum OrchestratorState {
    /// No managers exist.
    Disabled,
    /// At least one manager is live.
    Enabled,
}

// ── Diagnostic dump ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ClientDump {
    pub id: ManagerId,
    pub state: String,
    pub role: Option<String>,
    pub target_role: Option<String>,
    pub iface: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoftApDump {
    pub id: ManagerId,
    pub state: String,
    pub role: String,
    pub ssid: String,
    pub connected_stations: usize,
    pub iface: Option<String>,
}

/// Snapshot of everything the orchestrator knows, for diagnostics.
/// `Display` renders the human-readable form; serialize for JSON.
#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    pub state: OrchestratorState,
    pub emergency_active: bool,
    pub start_failures: u64,
    pub clients: Vec<ClientDump>,
    pub softaps: Vec<SoftApDump>,
    pub graveyard: Vec<Tombstone>,
}

impl DumpReport {
    /// Machine-readable rendition of the same snapshot.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DumpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "state: {} (emergency: {})",
            self.state,
            if self.emergency_active { "yes" } else { "no" }
        )?;
        writeln!(f, "start failures: {}", self.start_failures)?;
        writeln!(f, "client managers:")?;
        if self.clients.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for c in &self.clients {
            writeln!(
                f,
                "  {} state={} role={} target={} iface={}",
                c.id,
                c.state,
                c.role.as_deref().unwrap_or("-"),
                c.target_role.as_deref().unwrap_or("-"),
                c.iface.as_deref().unwrap_or("-"),
            )?;
        }
        writeln!(f, "soft AP managers:")?;
        if self.softaps.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for s in &self.softaps {
            writeln!(
                f,
                "  {} state={} role={} ssid={:?} stations={} iface={}",
                s.id,
                s.state,
                s.role,
                s.ssid,
                s.connected_stations,
                s.iface.as_deref().unwrap_or("-"),
            )?;
        }
        writeln!(f, "graveyard:")?;
        if self.graveyard.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for t in &self.graveyard {
            writeln!(
                f,
                "  {} {} role={} reason={:?}",
                t.id,
                t.kind,
                t.role.as_deref().unwrap_or("-"),
                t.stop_reason,
            )?;
        }
        Ok(())
    }
}

// ── Internal messages ───────────────────────────────────────────────

/// Snapshot taken by a recovery restart before teardown.
#[derive(Debug, Clone)]
struct RecoverySnapshot {
    clients: Vec<(ClientRole, Requestor)>,
    softaps: Vec<(SoftApConfig, Requestor)>,
}

impl RecoverySnapshot {
    fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.softaps.is_empty()
    }
}

/// Messages the run loop sends itself (timer firings).
#[derive(Debug)]
enum InternalMsg {
    DeferredStopFired { id: ManagerId, generation: u64 },
    SoftApIdleFired { id: ManagerId, generation: u64 },
    RecoveryDelayElapsed { snapshot: RecoverySnapshot },
}

// ── Handle ──────────────────────────────────────────────────────────

/// Cheaply cloneable handle to a running orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    command_tx: mpsc::Sender<CommandEnvelope>,
    state_rx: watch::Receiver<OrchestratorState>,
    event_tx: broadcast::Sender<Arc<ModeEvent>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Spawn the run task and return its handle. The initial state is
    /// derived from the settings snapshot before the first command is
    /// accepted.
    pub fn start(
        hal: Arc<dyn RadioHal>,
        hal_events: mpsc::UnboundedReceiver<HalEvent>,
        settings: &SettingsStore,
        config: OrchestratorConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (state_tx, state_rx) = watch::channel(OrchestratorState::Disabled);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let runner = Runner {
            graveyard: Graveyard::new(config.graveyard_depth),
            hal,
            config,
            clients: Vec::new(),
            softaps: Vec::new(),
            next_id: 1,
            coordinator: MakeBeforeBreak::new(),
            broadcasts: BroadcastQueue::new(),
            current_primary: None,
            emergency_callback: false,
            emergency_call: false,
            vowifi_active: false,
            start_failures: 0,
            settings: settings.snapshot(),
            state_tx,
            event_tx: event_tx.clone(),
            internal_tx,
            cancel: cancel.clone(),
            pending_events: VecDeque::new(),
            draining: false,
        };
        let settings_rx = settings.subscribe();
        let task = tokio::spawn(runner.run(command_rx, internal_rx, hal_events, settings_rx));

        Self {
            inner: Arc::new(OrchestratorInner {
                command_tx,
                state_rx,
                event_tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    // ── Observation ─────────────────────────────────────────────────

    /// Watch the `Disabled`/`Enabled` state.
    pub fn state(&self) -> watch::Receiver<OrchestratorState> {
        self.inner.state_rx.clone()
    }

    /// Subscribe to the event bus.
    pub fn events(&self) -> broadcast::Receiver<Arc<ModeEvent>> {
        self.inner.event_tx.subscribe()
    }

    /// The event bus as a `Stream`.
    pub fn event_stream(&self) -> BroadcastStream<Arc<ModeEvent>> {
        BroadcastStream::new(self.events())
    }

    // ── Command execution ───────────────────────────────────────────

    async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::OrchestratorShutdown)?;
        rx.await.map_err(|_| CoreError::OrchestratorShutdown)?
    }

    async fn execute_unit(&self, command: Command) -> Result<(), CoreError> {
        self.execute(command).await.map(|_| ())
    }

    pub async fn set_emergency_callback_mode(&self, on: bool) -> Result<(), CoreError> {
        self.execute_unit(Command::SetEmergencyCallbackMode(on)).await
    }

    pub async fn set_emergency_call_state(&self, on: bool) -> Result<(), CoreError> {
        self.execute_unit(Command::SetEmergencyCallState(on)).await
    }

    /// Start a hotspot. Returns the new manager's id; a typed
    /// `SoftApStartFailure` reaches the caller as `ConfigRejected`.
    pub async fn start_soft_ap(
        &self,
        role: SoftApRole,
        config: SoftApConfig,
        requestor: Requestor,
    ) -> Result<ManagerId, CoreError> {
        match self
            .execute(Command::StartSoftAp {
                role,
                config,
                requestor,
            })
            .await?
        {
            CommandResult::Manager(id) => Ok(id),
            _ => Err(CoreError::Unsupported {
                reason: "unexpected reply".into(),
            }),
        }
    }

    pub async fn stop_soft_ap(&self, scope: SoftApStopScope) -> Result<(), CoreError> {
        self.execute_unit(Command::StopSoftAp { scope }).await
    }

    pub async fn update_soft_ap_config(
        &self,
        id: ManagerId,
        config: SoftApConfig,
    ) -> Result<(), CoreError> {
        self.execute_unit(Command::UpdateSoftApConfig { id, config })
            .await
    }

    /// Request an extra connectivity manager. Degrades to the existing
    /// primary's id when the hardware cannot host another station
    /// interface.
    pub async fn request_additional_client_manager(
        &self,
        role: ClientRole,
        requestor: Requestor,
    ) -> Result<ManagerId, CoreError> {
        match self
            .execute(Command::RequestAdditionalClientManager { role, requestor })
            .await?
        {
            CommandResult::Manager(id) => Ok(id),
            _ => Err(CoreError::Unsupported {
                reason: "unexpected reply".into(),
            }),
        }
    }

    pub async fn release_client_manager(&self, id: ManagerId) -> Result<(), CoreError> {
        self.execute_unit(Command::ReleaseClientManager { id }).await
    }

    pub async fn set_client_role(&self, id: ManagerId, role: ClientRole) -> Result<(), CoreError> {
        self.execute_unit(Command::SetClientRole { id, role }).await
    }

    pub async fn notify_l3_validated(&self, id: ManagerId) -> Result<(), CoreError> {
        self.execute_unit(Command::NotifyL3Validated { id }).await
    }

    pub async fn set_vowifi_active(&self, active: bool) -> Result<(), CoreError> {
        self.execute_unit(Command::SetVowifiActive(active)).await
    }

    pub async fn recovery_restart(&self, reason: impl Into<String>) -> Result<(), CoreError> {
        self.execute_unit(Command::RecoveryRestart {
            reason: reason.into(),
        })
        .await
    }

    pub async fn recovery_disable(&self) -> Result<(), CoreError> {
        self.execute_unit(Command::RecoveryDisable).await
    }

    pub async fn dump(&self) -> Result<DumpReport, CoreError> {
        match self.execute(Command::Dump).await? {
            CommandResult::Dump(report) => Ok(report),
            _ => Err(CoreError::Unsupported {
                reason: "unexpected reply".into(),
            }),
        }
    }

    /// Stop the run task. Live managers are torn down on the way out.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

// ── Run task ────────────────────────────────────────────────────────

struct Runner {
    hal: Arc<dyn RadioHal>,
    config: OrchestratorConfig,
    clients: Vec<ClientModeManager>,
    softaps: Vec<SoftApModeManager>,
    next_id: u64,
    graveyard: Graveyard,
    coordinator: MakeBeforeBreak,
    broadcasts: BroadcastQueue,
    current_primary: Option<ManagerId>,
    emergency_callback: bool,
    emergency_call: bool,
    vowifi_active: bool,
    start_failures: u64,
    settings: Settings,
    state_tx: watch::Sender<OrchestratorState>,
    event_tx: broadcast::Sender<Arc<ModeEvent>>,
    internal_tx: mpsc::UnboundedSender<InternalMsg>,
    cancel: CancellationToken,
    pending_events: VecDeque<ModeEvent>,
    draining: bool,
}

impl Runner {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<CommandEnvelope>,
        mut internal_rx: mpsc::UnboundedReceiver<InternalMsg>,
        mut hal_events: mpsc::UnboundedReceiver<HalEvent>,
        mut settings_rx: watch::Receiver<Settings>,
    ) {
        let cancel = self.cancel.clone();
        let mut hal_open = true;
        let mut settings_open = true;

        // Initial state from the persisted settings snapshot.
        self.reconcile_settings();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                envelope = command_rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.handle_command(envelope.command);
                    let _ = envelope.response_tx.send(result);
                }
                msg = internal_rx.recv() => {
                    if let Some(msg) = msg {
                        self.handle_internal(msg);
                    }
                }
                event = hal_events.recv(), if hal_open => {
                    match event {
                        Some(event) => self.handle_hal_event(event),
                        None => hal_open = false,
                    }
                }
                changed = settings_rx.changed(), if settings_open => {
                    match changed {
                        Ok(()) => {
                            self.settings = *settings_rx.borrow_and_update();
                            self.reconcile_settings();
                        }
                        Err(_) => settings_open = false,
                    }
                }
            }
        }

        self.stop_all_softaps("orchestrator shutdown");
        self.stop_all_clients("orchestrator shutdown");
        info!("orchestrator stopped");
    }

    fn emergency_active(&self) -> bool {
        self.emergency_callback || self.emergency_call
    }

    fn mint_id(&mut self) -> ManagerId {
        let id = ManagerId(self.next_id);
        self.next_id += 1;
        id
    }

    // ── Command routing ─────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) -> Result<CommandResult, CoreError> {
        match command {
            Command::SetEmergencyCallbackMode(on) => {
                self.set_emergency(Some(on), None);
                Ok(CommandResult::Ok)
            }
            Command::SetEmergencyCallState(on) => {
                self.set_emergency(None, Some(on));
                Ok(CommandResult::Ok)
            }
            Command::StartSoftAp {
                role,
                config,
                requestor,
            } => self.start_soft_ap(role, config, requestor),
            Command::StopSoftAp { scope } => {
                self.stop_soft_ap_scope(scope);
                Ok(CommandResult::Ok)
            }
            Command::UpdateSoftApConfig { id, config } => {
                self.reject_in_emergency()?;
                let Some(i) = self.softap_index(id) else {
                    return Err(CoreError::ManagerNotFound { id: id.0 });
                };
                let directives = self.softaps[i].update_config(config);
                self.softap_directives(id, directives);
                Ok(CommandResult::Ok)
            }
            Command::RequestAdditionalClientManager { role, requestor } => {
                self.request_additional_client(role, requestor)
            }
            Command::ReleaseClientManager { id } => {
                if self.emergency_active() {
                    debug!(%id, "manager release swallowed during emergency");
                    return Ok(CommandResult::Ok);
                }
                if self.client_index(id).is_none() {
                    return Err(CoreError::ManagerNotFound { id: id.0 });
                }
                self.drive_client(
                    id,
                    ClientInput::Stop {
                        reason: "released by requestor".into(),
                    },
                );
                Ok(CommandResult::Ok)
            }
            Command::SetClientRole { id, role } => {
                self.set_client_role(id, role)?;
                Ok(CommandResult::Ok)
            }
            Command::NotifyL3Validated { id } => {
                if self.emergency_active() {
                    debug!(%id, "l3 validation swallowed during emergency");
                    return Ok(CommandResult::Ok);
                }
                if self.client_index(id).is_none() {
                    return Err(CoreError::ManagerNotFound { id: id.0 });
                }
                self.drive_client(id, ClientInput::L3Validated);
                Ok(CommandResult::Ok)
            }
            Command::SetVowifiActive(active) => {
                // The flag itself is always recorded; only the manager
                // fan-out is held back while the overlay is up, and
                // re-synced on exit.
                self.vowifi_active = active;
                if self.emergency_active() {
                    debug!(active, "vowifi fan-out swallowed during emergency");
                } else {
                    self.fan_out_vowifi();
                }
                Ok(CommandResult::Ok)
            }
            Command::RecoveryRestart { reason } => {
                self.recovery_restart(&reason);
                Ok(CommandResult::Ok)
            }
            Command::RecoveryDisable => {
                self.stop_all_softaps("recovery disable");
                self.stop_all_clients("recovery disable");
                Ok(CommandResult::Ok)
            }
            Command::Dump => Ok(CommandResult::Dump(self.dump())),
        }
    }

    fn reject_in_emergency(&self) -> Result<(), CoreError> {
        if self.emergency_active() {
            Err(CoreError::Unsupported {
                reason: "emergency mode active".into(),
            })
        } else {
            Ok(())
        }
    }

    // ── Internal messages ───────────────────────────────────────────

    fn handle_internal(&mut self, msg: InternalMsg) {
        match msg {
            InternalMsg::DeferredStopFired { id, generation } => {
                self.drive_client(id, ClientInput::DeferredStopFired { generation });
            }
            InternalMsg::SoftApIdleFired { id, generation } => {
                if let Some(i) = self.softap_index(id) {
                    let directives = self.softaps[i].idle_timer_fired(generation);
                    self.softap_directives(id, directives);
                }
            }
            InternalMsg::RecoveryDelayElapsed { snapshot } => {
                self.finish_recovery(snapshot);
            }
        }
    }

    fn handle_hal_event(&mut self, event: HalEvent) {
        match event {
            HalEvent::Interface(ev) => {
                if let Some(id) = self
                    .clients
                    .iter()
                    .find(|m| m.owns(&ev.handle))
                    .map(ClientModeManager::id)
                {
                    self.drive_client(id, ClientInput::Interface(ev.kind));
                } else if let Some(i) = self.softaps.iter().position(|m| m.owns(&ev.handle)) {
                    let id = self.softaps[i].id();
                    let directives = self.softaps[i].interface_event(ev.kind);
                    self.softap_directives(id, directives);
                } else {
                    debug!(iface = %ev.handle, kind = %ev.kind, "interface event for unknown handle");
                }
            }
            HalEvent::ApStation {
                handle,
                mac,
                connected,
            } => self.route_ap_station(&handle, mac, connected),
            HalEvent::DaemonDeath => {
                warn!("radio daemon death reported");
                self.recovery_restart("radio daemon death");
            }
        }
    }

    fn route_ap_station(&mut self, handle: &IfaceHandle, mac: MacAddress, connected: bool) {
        let Some(id) = self
            .softaps
            .iter()
            .find(|m| m.owns(handle))
            .map(SoftApModeManager::id)
        else {
            debug!(iface = %handle, "station event for unknown AP");
            return;
        };
        let Some(i) = self.softap_index(id) else {
            return;
        };
        let directives = if connected {
            self.softaps[i].station_connected(mac)
        } else {
            self.softaps[i].station_disconnected(&mac)
        };
        self.softap_directives(id, directives);
    }

    // ── Settings reconciliation ─────────────────────────────────────

    /// Make the live set match the persisted switches. Swallowed while
    /// the emergency overlay is active; re-run on exit.
    fn reconcile_settings(&mut self) {
        if self.emergency_active() {
            debug!("settings change swallowed during emergency");
            return;
        }
        if self.settings.airplane_mode {
            self.stop_all_softaps("airplane mode");
        }
        let desired = self.settings.derived_client_role();
        let owned = self
            .clients
            .iter()
            .find(|m| {
                matches!(
                    m.target_role(),
                    Some(ClientRole::Primary | ClientRole::ScanOnly)
                )
            })
            .map(|m| (m.id(), m.target_role()));
        match (desired, owned) {
            (None, _) => self.stop_all_clients("settings change"),
            (Some(role), None) => {
                let _ = self.create_client_manager(role, Requestor::internal("settings"));
            }
            (Some(role), Some((id, current))) => {
                // A deferring manager's pending op may contradict the
                // refreshed settings even when the target matches;
                // re-driving the role cancels or retargets the window.
                let deferring = self
                    .client_index(id)
                    .is_some_and(|i| self.clients[i].is_deferring_stop());
                if current != Some(role) || deferring {
                    self.drive_client(id, ClientInput::SetRole(role));
                }
            }
        }
    }

    // ── Emergency overlay ───────────────────────────────────────────

    fn set_emergency(&mut self, callback: Option<bool>, call: Option<bool>) {
        let was = self.emergency_active();
        if let Some(on) = callback {
            self.emergency_callback = on;
        }
        if let Some(on) = call {
            self.emergency_call = on;
        }
        let now = self.emergency_active();
        if !was && now {
            info!("entering emergency mode");
            self.stop_all_softaps("emergency mode");
            if self.config.stop_client_in_emergency {
                self.stop_all_clients("emergency mode");
            }
        } else if was && !now {
            // SoftAp state is never restored automatically; client
            // managers resume per the persisted toggle state. Surviving
            // managers may hold a stale VoWiFi view after the swallow.
            info!("leaving emergency mode");
            self.fan_out_vowifi();
            self.reconcile_settings();
        }
    }

    fn fan_out_vowifi(&mut self) {
        let active = self.vowifi_active;
        let ids: Vec<ManagerId> = self.clients.iter().map(ClientModeManager::id).collect();
        for id in ids {
            self.drive_client(id, ClientInput::VowifiChanged(active));
        }
    }

    // ── Recovery ────────────────────────────────────────────────────

    fn recovery_restart(&mut self, reason: &str) {
        if self.emergency_active() {
            warn!(%reason, "recovery swallowed during emergency");
            return;
        }
        let snapshot = RecoverySnapshot {
            clients: self
                .clients
                .iter()
                .filter_map(|m| {
                    match m.target_role() {
                        Some(role @ (ClientRole::Primary | ClientRole::ScanOnly)) => {
                            Some((role, m.requestor().clone()))
                        }
                        _ => None,
                    }
                })
                .collect(),
            softaps: self
                .softaps
                .iter()
                .filter(|m| m.role() == SoftApRole::Tethered && !m.is_terminal())
                .map(|m| (m.config().clone(), m.requestor().clone()))
                .collect(),
        };
        info!(%reason, clients = snapshot.clients.len(), softaps = snapshot.softaps.len(),
              "recovery restart: tearing down");
        self.stop_all_softaps(&format!("recovery: {reason}"));
        self.stop_all_clients(&format!("recovery: {reason}"));
        self.arm_timer(
            InternalMsg::RecoveryDelayElapsed { snapshot },
            self.config.recovery_delay(),
        );
    }

    fn finish_recovery(&mut self, snapshot: RecoverySnapshot) {
        if self.emergency_active() {
            debug!("recovery completion swallowed during emergency");
            return;
        }
        if snapshot.is_empty() {
            self.reconcile_settings();
            return;
        }
        for (role, requestor) in snapshot.clients {
            let already = self.clients.iter().any(|m| {
                matches!(
                    m.target_role(),
                    Some(ClientRole::Primary | ClientRole::ScanOnly)
                )
            });
            if already {
                debug!(%role, "recovery: settings-owned client manager already live");
                continue;
            }
            let _ = self.create_client_manager(role, requestor);
        }
        for (config, requestor) in snapshot.softaps {
            let already = self
                .softaps
                .iter()
                .any(|m| m.role() == SoftApRole::Tethered);
            if already {
                continue;
            }
            if let Err(e) = self.start_soft_ap(SoftApRole::Tethered, config, requestor) {
                warn!(error = %e, "recovery: soft AP restart failed");
            }
        }
    }

    // ── Client manager lifecycle ────────────────────────────────────

    fn create_client_manager(
        &mut self,
        role: ClientRole,
        requestor: Requestor,
    ) -> Result<ManagerId, CoreError> {
        let id = self.mint_id();
        let mut manager = ClientModeManager::new(
            id,
            Arc::clone(&self.hal),
            requestor,
            role,
            self.config.deferred_stop_timeout(),
        );
        let directives = manager.handle(ClientInput::Start);
        if self.vowifi_active {
            manager.handle(ClientInput::VowifiChanged(true));
        }
        let failure = directives.iter().find_map(|d| match d {
            ClientDirective::Outcome(ClientOutcome::StartFailed { error }) => Some(error.clone()),
            _ => None,
        });
        self.clients.push(manager);
        self.client_directives(id, directives);
        if let Some(error) = failure {
            return Err(CoreError::from(error));
        }
        // Landing substate is always scan-only; push to the target role.
        if role.is_connectivity_capable() {
            self.drive_client(id, ClientInput::SetRole(role));
        }
        Ok(id)
    }

    fn request_additional_client(
        &mut self,
        role: ClientRole,
        requestor: Requestor,
    ) -> Result<CommandResult, CoreError> {
        self.reject_in_emergency()?;
        if !role.is_connectivity_capable() || role == ClientRole::Primary {
            return Err(CoreError::Unsupported {
                reason: format!("{role} cannot be requested as an additional manager"),
            });
        }
        if self.hal.can_create_additional_station_interface(&requestor) {
            let id = self.create_client_manager(role, requestor)?;
            return Ok(CommandResult::Manager(id));
        }
        // Graceful degradation: hand back the existing primary.
        match self.current_primary {
            Some(id) => {
                debug!(%role, fallback = %id, "no extra station interface; sharing primary");
                Ok(CommandResult::Manager(id))
            }
            None => Err(CoreError::StartFailure {
                reason: "no station interface available and no primary to share".into(),
            }),
        }
    }

    fn set_client_role(&mut self, id: ManagerId, role: ClientRole) -> Result<(), CoreError> {
        self.reject_in_emergency()?;
        if self.client_index(id).is_none() {
            return Err(CoreError::ManagerNotFound { id: id.0 });
        }
        let taken_by_other = |probe: ClientRole, clients: &[ClientModeManager]| {
            clients
                .iter()
                .any(|m| m.id() != id && m.target_role() == Some(probe))
        };
        if role == ClientRole::Primary && taken_by_other(ClientRole::Primary, &self.clients) {
            return Err(CoreError::Unsupported {
                reason: "another manager already holds Primary".into(),
            });
        }
        if role == ClientRole::ScanOnly && taken_by_other(ClientRole::ScanOnly, &self.clients) {
            return Err(CoreError::Unsupported {
                reason: "another manager already holds ScanOnly".into(),
            });
        }
        self.drive_client(id, ClientInput::SetRole(role));
        Ok(())
    }

    fn client_index(&self, id: ManagerId) -> Option<usize> {
        self.clients.iter().position(|m| m.id() == id)
    }

    fn drive_client(&mut self, id: ManagerId, input: ClientInput) {
        let Some(i) = self.client_index(id) else {
            debug!(%id, ?input, "input for a manager no longer live");
            return;
        };
        let directives = self.clients[i].handle(input);
        self.client_directives(id, directives);
    }

    fn stop_all_clients(&mut self, reason: &str) {
        let ids: Vec<ManagerId> = self.clients.iter().map(ClientModeManager::id).collect();
        for id in ids {
            self.drive_client(
                id,
                ClientInput::Stop {
                    reason: reason.to_owned(),
                },
            );
        }
    }

    fn client_directives(&mut self, id: ManagerId, directives: Vec<ClientDirective>) {
        for directive in directives {
            match directive {
                ClientDirective::ArmDeferredStop {
                    generation,
                    timeout,
                } => {
                    self.arm_timer(InternalMsg::DeferredStopFired { id, generation }, timeout);
                }
                ClientDirective::Outcome(outcome) => self.client_outcome(id, outcome),
            }
        }
    }

    fn client_outcome(&mut self, id: ManagerId, outcome: ClientOutcome) {
        match outcome {
            ClientOutcome::Started => {
                self.publish(ModeEvent::ManagerAdded {
                    id,
                    kind: ManagerKind::Client,
                });
                self.update_state();
            }
            ClientOutcome::StartFailed { error } => {
                let reason = error.to_string();
                self.start_failures += 1;
                self.publish(ModeEvent::StartFailed {
                    id,
                    kind: ManagerKind::Client,
                    reason: reason.clone(),
                });
                self.remove_client(id, &reason);
            }
            ClientOutcome::RoleChanged { old, new } => {
                self.publish(ModeEvent::ClientRoleChanged {
                    id,
                    old: Some(old),
                    new,
                });
                self.refresh_primary();
            }
            ClientOutcome::Stopped { reason } => {
                self.remove_client(id, &reason);
            }
            ClientOutcome::L3Validated => {
                self.publish(ModeEvent::L3Validated { id });
            }
            ClientOutcome::Broadcast {
                broadcast,
                as_primary,
            } => {
                let delivered = self.broadcasts.enqueue_or_send(id, as_primary, broadcast);
                for b in delivered {
                    self.publish(ModeEvent::LegacyBroadcast { id, broadcast: b });
                }
            }
            ClientOutcome::EscalateRecovery { reason } => {
                self.recovery_restart(&reason);
            }
        }
    }

    /// Stopped and startFailed managers leave the live set the same way.
    fn remove_client(&mut self, id: ManagerId, reason: &str) {
        let Some(i) = self.client_index(id) else {
            return;
        };
        let manager = self.clients.remove(i);
        self.graveyard.bury(Tombstone::new(
            id,
            ManagerKind::Client,
            manager.role().map(|r| r.to_string()),
            reason,
        ));
        self.broadcasts.discard(id);
        self.publish(ModeEvent::ManagerRemoved {
            id,
            kind: ManagerKind::Client,
        });
        self.refresh_primary();
        self.update_state();
    }

    // ── SoftAp manager lifecycle ────────────────────────────────────

    fn start_soft_ap(
        &mut self,
        role: SoftApRole,
        config: SoftApConfig,
        requestor: Requestor,
    ) -> Result<CommandResult, CoreError> {
        self.reject_in_emergency()?;
        if !self.hal.can_create_ap_interface(&requestor) {
            return Err(CoreError::StartFailure {
                reason: "no AP interface available".into(),
            });
        }
        let id = self.mint_id();
        let mut manager = SoftApModeManager::new(
            id,
            Arc::clone(&self.hal),
            requestor,
            role,
            config,
            self.config.softap.clone(),
        );
        let directives = manager.start();
        let failure = directives.iter().find_map(|d| match d {
            SoftApDirective::Outcome(SoftApOutcome::StartFailed { failure }) => {
                Some(failure.clone())
            }
            _ => None,
        });
        self.softaps.push(manager);
        self.softap_directives(id, directives);
        match failure {
            Some(f) => Err(CoreError::ConfigRejected(f)),
            None => Ok(CommandResult::Manager(id)),
        }
    }

    fn stop_soft_ap_scope(&mut self, scope: SoftApStopScope) {
        let ids: Vec<ManagerId> = self
            .softaps
            .iter()
            .filter(|m| match scope {
                SoftApStopScope::All => true,
                SoftApStopScope::Tethered => m.role() == SoftApRole::Tethered,
                SoftApStopScope::LocalOnlyHotspot => m.role() == SoftApRole::LocalOnlyHotspot,
            })
            .map(SoftApModeManager::id)
            .collect();
        for id in ids {
            if let Some(i) = self.softap_index(id) {
                let directives = self.softaps[i].stop("stop requested");
                self.softap_directives(id, directives);
            }
        }
    }

    fn stop_all_softaps(&mut self, reason: &str) {
        let ids: Vec<ManagerId> = self.softaps.iter().map(SoftApModeManager::id).collect();
        for id in ids {
            if let Some(i) = self.softap_index(id) {
                let directives = self.softaps[i].stop(reason);
                self.softap_directives(id, directives);
            }
        }
    }

    fn softap_index(&self, id: ManagerId) -> Option<usize> {
        self.softaps.iter().position(|m| m.id() == id)
    }

    fn softap_directives(&mut self, id: ManagerId, directives: Vec<SoftApDirective>) {
        for directive in directives {
            match directive {
                SoftApDirective::ArmIdleTimer {
                    generation,
                    timeout,
                } => {
                    self.arm_timer(InternalMsg::SoftApIdleFired { id, generation }, timeout);
                }
                SoftApDirective::CancelIdleTimer => {
                    // Cancellation is by generation: the stale fire is a
                    // no-op when it arrives.
                }
                SoftApDirective::Outcome(outcome) => self.softap_outcome(id, outcome),
            }
        }
    }

    fn softap_outcome(&mut self, id: ManagerId, outcome: SoftApOutcome) {
        match outcome {
            SoftApOutcome::Started => {
                self.publish(ModeEvent::ManagerAdded {
                    id,
                    kind: ManagerKind::SoftAp,
                });
                self.update_state();
            }
            SoftApOutcome::StartFailed { failure } => {
                self.start_failures += 1;
                self.publish(ModeEvent::StartFailed {
                    id,
                    kind: ManagerKind::SoftAp,
                    reason: failure.to_string(),
                });
                self.remove_softap(id, &failure.to_string());
            }
            SoftApOutcome::Stopped { reason } => {
                self.remove_softap(id, &reason);
            }
            SoftApOutcome::StationsChanged { connected } => {
                self.publish(ModeEvent::SoftApStationsChanged { id, connected });
            }
        }
    }

    fn remove_softap(&mut self, id: ManagerId, reason: &str) {
        let Some(i) = self.softap_index(id) else {
            return;
        };
        let manager = self.softaps.remove(i);
        self.graveyard.bury(Tombstone::new(
            id,
            ManagerKind::SoftAp,
            Some(manager.role().to_string()),
            reason,
        ));
        self.publish(ModeEvent::ManagerRemoved {
            id,
            kind: ManagerKind::SoftAp,
        });
        self.update_state();
    }

    // ── Event bus, satellites, bookkeeping ──────────────────────────

    /// Publish one event and run the satellites over everything the bus
    /// produces, in order. Re-entrant: satellite actions that produce
    /// further events append to the same queue instead of recursing.
    fn publish(&mut self, event: ModeEvent) {
        self.pending_events.push_back(event);
        if self.draining {
            return;
        }
        self.draining = true;
        while let Some(event) = self.pending_events.pop_front() {
            let _ = self.event_tx.send(Arc::new(event.clone()));
            let view = self.live_view();
            let actions = self.coordinator.on_event(&event, &view);
            for action in actions {
                self.apply_handover(action);
            }
        }
        self.draining = false;
    }

    fn live_view(&self) -> LiveClientView {
        LiveClientView {
            roles: self
                .clients
                .iter()
                .filter_map(|m| m.role().map(|role| (m.id(), role)))
                .collect(),
        }
    }

    fn apply_handover(&mut self, action: HandoverAction) {
        match action {
            HandoverAction::Demote { id } => {
                self.drive_client(id, ClientInput::SetRole(ClientRole::SecondaryTransient));
            }
            HandoverAction::Promote { id } => {
                self.drive_client(id, ClientInput::SetRole(ClientRole::Primary));
            }
            HandoverAction::Stop { id } => {
                self.drive_client(
                    id,
                    ClientInput::Stop {
                        reason: "superseded by handover".into(),
                    },
                );
            }
        }
    }

    /// Track the identity of the primary manager; on promotion, flush the
    /// new primary's buffered broadcasts FIFO.
    fn refresh_primary(&mut self) {
        let new = self
            .clients
            .iter()
            .find(|m| m.role() == Some(ClientRole::Primary))
            .map(ClientModeManager::id);
        if new == self.current_primary {
            return;
        }
        let old = self.current_primary;
        self.current_primary = new;
        self.publish(ModeEvent::PrimaryChanged { old, new });
        if let Some(id) = new {
            for broadcast in self.broadcasts.flush_on_promotion(id) {
                self.publish(ModeEvent::LegacyBroadcast { id, broadcast });
            }
        }
    }

    fn update_state(&mut self) {
        let new = if self.clients.is_empty() && self.softaps.is_empty() {
            OrchestratorState::Disabled
        } else {
            OrchestratorState::Enabled
        };
        if *self.state_tx.borrow() != new {
            info!(state = %new, "orchestrator state changed");
            let _ = self.state_tx.send(new);
            self.publish(ModeEvent::StateChanged(new));
        }
    }

    fn arm_timer(&self, msg: InternalMsg, after: Duration) {
        let tx = self.internal_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    let _ = tx.send(msg);
                }
            }
        });
    }

    // ── Dump ────────────────────────────────────────────────────────

    fn dump(&self) -> DumpReport {
        DumpReport {
            state: *self.state_tx.borrow(),
            emergency_active: self.emergency_active(),
            start_failures: self.start_failures,
            clients: self
                .clients
                .iter()
                .map(|m| ClientDump {
                    id: m.id(),
                    state: m.state().to_string(),
                    role: m.role().map(|r| r.to_string()),
                    target_role: m.target_role().map(|r| r.to_string()),
                    iface: m.iface().map(ToString::to_string),
                })
                .collect(),
            softaps: self
                .softaps
                .iter()
                .map(|m| SoftApDump {
                    id: m.id(),
                    state: m.state().to_string(),
                    role: m.role().to_string(),
                    ssid: m.config().ssid.clone(),
                    connected_stations: m.connected_count(),
                    iface: m.iface().map(ToString::to_string),
                })
                .collect(),
            graveyard: self.graveyard.records().cloned().collect(),
        }
    }
}
