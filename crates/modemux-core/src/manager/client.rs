// ── Client Mode Manager ──
//
// Owns one station interface. The state machine is a pure function
// `plan(state, input, ctx) -> (state, steps)`; the driver below executes
// the steps against the HAL and reports outcomes to the orchestrator.
// The connectivity engine exists exactly while the manager is in
// `Connect` (or its deferred-stop window).
//
// Invariant: a manager that cannot complete a transition is stopped,
// never left half-way. A HAL rejection mid-plan forces an unconditional
// stop.

use std::sync::Arc;
use std::time::Duration;

use modemux_hal::{IfaceHandle, InterfaceEventKind, RadioHal, Requestor};
use tracing::{debug, warn};

use crate::events::LegacyBroadcast;
use crate::manager::ManagerId;
use crate::manager::engine::ConnectivityEngine;
use crate::role::ClientRole;

// ── State machine types ─────────────────────────────────────────────

/// Operation parked behind a deferred-stop window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    SwitchToScanOnly,
    Stop { reason: String },
}

/// Private lifecycle state. `Stopped` is terminal: the orchestrator
/// buries the manager once it observes the `Stopped` outcome.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
pub enum ClientState {
    Idle,
    ScanOnly,
    Connect,
    #[strum(serialize = "DeferringStop")]
    DeferringStop { pending: PendingOp },
    Stopped,
}

/// Messages the manager reacts to. All arrive on the orchestrator's
/// serialized queue; at most one is ever in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    Start,
    SetRole(ClientRole),
    Stop { reason: String },
    VowifiChanged(bool),
    DeferredStopFired { generation: u64 },
    L3Validated,
    Interface(InterfaceEventKind),
}

/// Side effects a transition asks the driver to perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CreateInterface,
    TeardownInterface,
    HalSwitchToScanOnly,
    HalSwitchToConnectivity,
    StartEngine,
    StopEngine,
    SetRole(ClientRole),
    ArmDeferredStop { generation: u64 },
    EmitStarted,
    EmitStopped { reason: String },
    EmitBroadcast(LegacyBroadcast),
    EmitL3Validated,
    EscalateRecovery { reason: String },
}

/// What the orchestrator learns from one handled input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutcome {
    Started,
    StartFailed { error: modemux_hal::HalError },
    RoleChanged { old: ClientRole, new: ClientRole },
    Stopped {
        reason: String,
    },
    L3Validated,
    Broadcast {
        broadcast: LegacyBroadcast,
        /// Role held at the moment the broadcast was generated. A
        /// demotion emits its broadcasts before the role flips, so the
        /// queue must not re-read the live manager.
        as_primary: bool,
    },
    EscalateRecovery {
        reason: String,
    },
}

/// Outcomes plus timer requests. Timers are scheduled by the
/// orchestrator against its own queue, never inside the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientDirective {
    Outcome(ClientOutcome),
    ArmDeferredStop {
        generation: u64,
        timeout: Duration,
    },
}

/// Read-only context the pure transition function sees.
#[derive(Debug, Clone, Copy)]
pub struct TransitionCtx {
    pub role: Option<ClientRole>,
    pub vowifi_active: bool,
    pub deferred_stop_timeout: Duration,
    /// Current timer generation; arming uses `generation + 1`.
    pub timer_generation: u64,
}

// ── Pure transitions ────────────────────────────────────────────────

/// Steps that leave `Connect` for `ScanOnly` (engine dies with the
/// substate, broadcasts fire only now -- after any deferral window).
fn exit_to_scan_only(role: Option<ClientRole>) -> Vec<Step> {
    let mut steps = Vec::new();
    if role == Some(ClientRole::Primary) {
        steps.push(Step::EmitBroadcast(LegacyBroadcast::Disabling));
    }
    steps.push(Step::EmitBroadcast(LegacyBroadcast::ConnectivityState {
        connected: false,
        network: None,
    }));
    steps.push(Step::StopEngine);
    steps.push(Step::HalSwitchToScanOnly);
    steps.push(Step::SetRole(ClientRole::ScanOnly));
    steps
}

/// Steps that stop the manager from `Connect`.
fn stop_from_connect(role: Option<ClientRole>, reason: String) -> Vec<Step> {
    let mut steps = Vec::new();
    if role == Some(ClientRole::Primary) {
        steps.push(Step::EmitBroadcast(LegacyBroadcast::Disabling));
    }
    steps.push(Step::EmitBroadcast(LegacyBroadcast::ConnectivityState {
        connected: false,
        network: None,
    }));
    steps.push(Step::StopEngine);
    steps.push(Step::TeardownInterface);
    steps.push(Step::EmitStopped { reason });
    steps
}

fn complete_pending(pending: PendingOp, ctx: &TransitionCtx) -> (ClientState, Vec<Step>) {
    match pending {
        PendingOp::SwitchToScanOnly => (ClientState::ScanOnly, exit_to_scan_only(ctx.role)),
        PendingOp::Stop { reason } => (ClientState::Stopped, stop_from_connect(ctx.role, reason)),
    }
}

/// Whether leaving `Connect` must wait for the VoWiFi session.
fn must_defer(ctx: &TransitionCtx) -> bool {
    ctx.vowifi_active && !ctx.deferred_stop_timeout.is_zero()
}

/// The transition function. Everything interesting about the client
/// manager is decided here, with no I/O.
#[allow(clippy::too_many_lines)]
pub fn plan(
    state: ClientState,
    input: ClientInput,
    ctx: &TransitionCtx,
) -> (ClientState, Vec<Step>) {
    match (state, input) {
        // ── Idle ────────────────────────────────────────────────────
        (ClientState::Idle, ClientInput::Start) => (
            // Scan-only is always the landing substate after creation,
            // regardless of the role the manager was created for.
            ClientState::ScanOnly,
            vec![
                Step::CreateInterface,
                Step::SetRole(ClientRole::ScanOnly),
                Step::EmitStarted,
            ],
        ),
        (ClientState::Idle, ClientInput::Stop { reason }) => {
            (ClientState::Stopped, vec![Step::EmitStopped { reason }])
        }

        // ── ScanOnly ────────────────────────────────────────────────
        (ClientState::ScanOnly, ClientInput::SetRole(role)) if role.is_connectivity_capable() => (
            ClientState::Connect,
            vec![
                Step::HalSwitchToConnectivity,
                Step::StartEngine,
                Step::SetRole(role),
                Step::EmitBroadcast(LegacyBroadcast::ConnectivityState {
                    connected: true,
                    network: None,
                }),
            ],
        ),
        (ClientState::ScanOnly, ClientInput::SetRole(ClientRole::ScanOnly)) => {
            (ClientState::ScanOnly, Vec::new())
        }
        (ClientState::ScanOnly, ClientInput::Stop { reason }) => (
            ClientState::Stopped,
            vec![Step::TeardownInterface, Step::EmitStopped { reason }],
        ),

        // ── Connect ─────────────────────────────────────────────────
        (ClientState::Connect, ClientInput::SetRole(ClientRole::ScanOnly)) => {
            if must_defer(ctx) {
                (
                    ClientState::DeferringStop {
                        pending: PendingOp::SwitchToScanOnly,
                    },
                    vec![Step::ArmDeferredStop {
                        generation: ctx.timer_generation + 1,
                    }],
                )
            } else {
                (ClientState::ScanOnly, exit_to_scan_only(ctx.role))
            }
        }
        (ClientState::Connect, ClientInput::SetRole(role)) => {
            // Connectivity-capable to connectivity-capable: pure
            // relabeling, no interface mode change.
            (ClientState::Connect, vec![Step::SetRole(role)])
        }
        (ClientState::Connect, ClientInput::Stop { reason }) => {
            if must_defer(ctx) {
                (
                    ClientState::DeferringStop {
                        pending: PendingOp::Stop { reason },
                    },
                    vec![Step::ArmDeferredStop {
                        generation: ctx.timer_generation + 1,
                    }],
                )
            } else {
                (
                    ClientState::Stopped,
                    stop_from_connect(ctx.role, reason),
                )
            }
        }
        (ClientState::Connect, ClientInput::L3Validated) => {
            (ClientState::Connect, vec![Step::EmitL3Validated])
        }

        // ── DeferringStop ───────────────────────────────────────────
        (ClientState::DeferringStop { .. }, ClientInput::Stop { reason }) => {
            // Stop is unconditional: it replaces a pending scan-only
            // switch but keeps the already-armed window running.
            (
                ClientState::DeferringStop {
                    pending: PendingOp::Stop { reason },
                },
                Vec::new(),
            )
        }
        (ClientState::DeferringStop { pending }, ClientInput::VowifiChanged(false)) => {
            complete_pending(pending, ctx)
        }
        (
            ClientState::DeferringStop { pending },
            ClientInput::DeferredStopFired { generation },
        ) if generation == ctx.timer_generation => complete_pending(pending, ctx),
        (state @ ClientState::DeferringStop { .. }, ClientInput::DeferredStopFired { .. }) => {
            // Stale generation: the window it guarded is over.
            (state, Vec::new())
        }
        (ClientState::DeferringStop { .. }, ClientInput::SetRole(role))
            if role.is_connectivity_capable() =>
        {
            // Connectivity is wanted again before the window closed. The
            // interface never left connectivity mode, so the pending op
            // is simply dropped; the armed timer fires into `Connect`
            // where it is ignored.
            (ClientState::Connect, vec![Step::SetRole(role)])
        }
        (ClientState::DeferringStop { .. }, ClientInput::SetRole(ClientRole::ScanOnly)) => {
            // A newer request supersedes the pending op; the window
            // itself keeps running.
            (
                ClientState::DeferringStop {
                    pending: PendingOp::SwitchToScanOnly,
                },
                Vec::new(),
            )
        }

        // ── Interface events (any started state) ────────────────────
        (
            ClientState::ScanOnly | ClientState::Connect | ClientState::DeferringStop { .. },
            ClientInput::Interface(InterfaceEventKind::Destroyed),
        ) => (
            ClientState::Stopped,
            vec![
                Step::StopEngine,
                Step::EmitStopped {
                    reason: "interface destroyed".into(),
                },
            ],
        ),
        (
            state @ (ClientState::ScanOnly
            | ClientState::Connect
            | ClientState::DeferringStop { .. }),
            ClientInput::Interface(InterfaceEventKind::Down),
        ) => (
            state,
            vec![Step::EscalateRecovery {
                reason: "interface went down unexpectedly".into(),
            }],
        ),

        // Everything else is a no-op: stale timers, Up edges, inputs to
        // a terminal manager.
        (state, input) => {
            debug!(%state, ?input, "client transition ignored");
            (state, Vec::new())
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────

/// A live client manager: state plus the resources the steps act on.
pub struct ClientModeManager {
    id: ManagerId,
    hal: Arc<dyn RadioHal>,
    requestor: Requestor,
    state: ClientState,
    role: Option<ClientRole>,
    target_role: Option<ClientRole>,
    iface: Option<IfaceHandle>,
    engine: Option<ConnectivityEngine>,
    vowifi_active: bool,
    timer_generation: u64,
    deferred_stop_timeout: Duration,
}

impl ClientModeManager {
    pub fn new(
        id: ManagerId,
        hal: Arc<dyn RadioHal>,
        requestor: Requestor,
        target_role: ClientRole,
        deferred_stop_timeout: Duration,
    ) -> Self {
        Self {
            id,
            hal,
            requestor,
            state: ClientState::Idle,
            role: None,
            target_role: Some(target_role),
            iface: None,
            engine: None,
            vowifi_active: false,
            timer_generation: 0,
            deferred_stop_timeout,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn role(&self) -> Option<ClientRole> {
        self.role
    }

    pub fn target_role(&self) -> Option<ClientRole> {
        self.target_role
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn iface(&self) -> Option<&IfaceHandle> {
        self.iface.as_ref()
    }

    pub fn requestor(&self) -> &Requestor {
        &self.requestor
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ClientState::Stopped
    }

    /// Whether the manager is parked in a deferral window with an op
    /// still pending.
    pub fn is_deferring_stop(&self) -> bool {
        matches!(self.state, ClientState::DeferringStop { .. })
    }

    /// Whether this manager owns the given interface handle.
    pub fn owns(&self, handle: &IfaceHandle) -> bool {
        self.iface.as_ref().is_some_and(|h| h.id == handle.id)
    }

    // ── Message handling ────────────────────────────────────────────

    /// Run one input through the state machine and execute the plan.
    pub fn handle(&mut self, input: ClientInput) -> Vec<ClientDirective> {
        if let ClientInput::VowifiChanged(active) = input {
            self.vowifi_active = active;
        }
        let ctx = TransitionCtx {
            role: self.role,
            vowifi_active: self.vowifi_active,
            deferred_stop_timeout: self.deferred_stop_timeout,
            timer_generation: self.timer_generation,
        };
        let state = std::mem::replace(&mut self.state, ClientState::Stopped);
        let (next, steps) = plan(state, input, &ctx);
        self.state = next;
        self.execute(steps)
    }

    #[allow(clippy::too_many_lines)]
    fn execute(&mut self, steps: Vec<Step>) -> Vec<ClientDirective> {
        let mut out = Vec::new();
        for step in steps {
            match step {
                Step::CreateInterface => {
                    match self.hal.create_station_interface(&self.requestor) {
                        Ok(handle) => {
                            debug!(id = %self.id, iface = %handle, "station interface created");
                            self.iface = Some(handle);
                        }
                        Err(e) => {
                            warn!(id = %self.id, error = %e, "station interface creation failed");
                            self.state = ClientState::Stopped;
                            out.push(ClientDirective::Outcome(ClientOutcome::StartFailed {
                                error: e,
                            }));
                            return out;
                        }
                    }
                }
                Step::TeardownInterface => {
                    if let Some(handle) = self.iface.take() {
                        if let Err(e) = self.hal.teardown_interface(&handle) {
                            warn!(id = %self.id, iface = %handle, error = %e, "teardown failed");
                        }
                    }
                }
                Step::HalSwitchToScanOnly => {
                    if let Err(e) = self.try_switch(false) {
                        return self.abort_transition(out, e);
                    }
                }
                Step::HalSwitchToConnectivity => {
                    if let Err(e) = self.try_switch(true) {
                        return self.abort_transition(out, e);
                    }
                }
                Step::StartEngine => {
                    if let Some(handle) = self.iface.clone() {
                        self.engine = Some(ConnectivityEngine::start(handle));
                    }
                }
                Step::StopEngine => {
                    if let Some(engine) = self.engine.take() {
                        engine.stop();
                    }
                }
                Step::SetRole(new) => {
                    let old = self.role.replace(new);
                    self.target_role = Some(new);
                    if let Some(old) = old {
                        if old != new {
                            out.push(ClientDirective::Outcome(ClientOutcome::RoleChanged {
                                old,
                                new,
                            }));
                        }
                    }
                }
                Step::ArmDeferredStop { generation } => {
                    self.timer_generation = generation;
                    out.push(ClientDirective::ArmDeferredStop {
                        generation,
                        timeout: self.deferred_stop_timeout,
                    });
                }
                Step::EmitStarted => {
                    out.push(ClientDirective::Outcome(ClientOutcome::Started));
                }
                Step::EmitStopped { reason } => {
                    self.iface = None;
                    out.push(ClientDirective::Outcome(ClientOutcome::Stopped { reason }));
                }
                Step::EmitBroadcast(b) => {
                    out.push(ClientDirective::Outcome(ClientOutcome::Broadcast {
                        broadcast: b,
                        as_primary: self.role == Some(ClientRole::Primary),
                    }));
                }
                Step::EmitL3Validated => {
                    match self.engine.as_mut() {
                        Some(engine) if engine.is_l3_validated() => {
                            // Repeat notifications must not re-trigger a
                            // handover.
                            debug!(id = %self.id, "duplicate l3 validation ignored");
                        }
                        Some(engine) => {
                            engine.mark_l3_validated();
                            debug!(id = %self.id, iface = %engine.iface(), "connection passed l3 validation");
                            out.push(ClientDirective::Outcome(ClientOutcome::L3Validated));
                        }
                        None => {}
                    }
                }
                Step::EscalateRecovery { reason } => {
                    // A Down event can race a link that already came
                    // back; trust the live interface state.
                    let recovered = self
                        .iface
                        .as_ref()
                        .is_some_and(|h| self.hal.is_interface_up(h).unwrap_or(false));
                    if recovered {
                        debug!(id = %self.id, "interface reports up again; recovery skipped");
                    } else {
                        out.push(ClientDirective::Outcome(ClientOutcome::EscalateRecovery {
                            reason,
                        }));
                    }
                }
            }
        }
        out
    }

    fn try_switch(&self, connectivity: bool) -> Result<(), modemux_hal::HalError> {
        let Some(handle) = self.iface.as_ref() else {
            return Ok(());
        };
        if connectivity {
            self.hal.switch_to_connectivity(handle)
        } else {
            self.hal.switch_to_scan_only(handle)
        }
    }

    /// A HAL rejection mid-transition: stop rather than stay half-way.
    fn abort_transition(
        &mut self,
        mut out: Vec<ClientDirective>,
        err: modemux_hal::HalError,
    ) -> Vec<ClientDirective> {
        warn!(id = %self.id, error = %err, "transition aborted; stopping manager");
        if let Some(engine) = self.engine.take() {
            engine.stop();
        }
        if let Some(handle) = self.iface.take() {
            if let Err(e) = self.hal.teardown_interface(&handle) {
                warn!(id = %self.id, iface = %handle, error = %e, "cleanup teardown failed");
            }
        }
        self.state = ClientState::Stopped;
        out.push(ClientDirective::Outcome(ClientOutcome::Stopped {
            reason: format!("transition failed: {err}"),
        }));
        out
    }
}
