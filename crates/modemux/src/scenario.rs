//! Scripted demo scenarios.
//!
//! Each scenario stands up an orchestrator over a [`FakeRadio`], drives
//! a short sequence of commands and injected events, and returns the
//! bus traffic plus a final dump. The binary runs on real time, so the
//! scripts keep their timers short where they can and settle with small
//! sleeps between steps.

use std::sync::Arc;
use std::time::Duration;

use miette::{IntoDiagnostic, Result, miette};
use tokio::sync::broadcast;
use tracing::info;

use modemux_core::{
    ClientRole, DumpReport, ManagerId, ModeEvent, Orchestrator, OrchestratorConfig, Settings,
    SettingsStore, SoftApConfig, SoftApRole,
};
use modemux_hal::{FakeRadio, IfaceHandle, IfaceKind, MacAddress, RadioHal, Requestor};

use crate::cli::Scenario;

/// What a scenario run produced: every bus event in order, then the
/// final dump.
pub struct ScenarioReport {
    pub events: Vec<ModeEvent>,
    pub dump: DumpReport,
}

/// Run one scenario to completion.
pub async fn run(scenario: Scenario, config: OrchestratorConfig) -> Result<ScenarioReport> {
    let recovery_delay = config.recovery_delay();
    let mut sim = Sim::start(Settings::default(), config);
    let outcome = match scenario {
        Scenario::ToggleCycle => toggle_cycle(&mut sim).await,
        Scenario::HotspotEmergency => hotspot_emergency(&mut sim).await,
        Scenario::Handover => handover(&mut sim).await,
        Scenario::Recovery => recovery(&mut sim, recovery_delay).await,
        Scenario::SoftapAdmission => softap_admission(&mut sim).await,
    };
    match outcome {
        Ok(()) => sim.finish().await,
        Err(err) => {
            sim.orchestrator.shutdown().await;
            Err(err)
        }
    }
}

// ── Harness ──────────────────────────────────────────────────────────

struct Sim {
    orchestrator: Orchestrator,
    fake: Arc<FakeRadio>,
    settings: SettingsStore,
    events: broadcast::Receiver<Arc<ModeEvent>>,
    log: Vec<ModeEvent>,
}

impl Sim {
    fn start(initial: Settings, config: OrchestratorConfig) -> Self {
        let (fake, hal_events) = FakeRadio::new();
        let fake = Arc::new(fake);
        let hal: Arc<dyn RadioHal> = Arc::clone(&fake) as Arc<dyn RadioHal>;
        let settings = SettingsStore::new(initial);
        let orchestrator = Orchestrator::start(hal, hal_events, &settings, config);
        let events = orchestrator.events();
        Self {
            orchestrator,
            fake,
            settings,
            events,
            log: Vec::new(),
        }
    }

    /// Let the run loop drain, then collect whatever landed on the bus.
    async fn settle(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Ok(event) = self.events.try_recv() {
            self.log.push((*event).clone());
        }
    }

    async fn dump(&self) -> Result<DumpReport> {
        self.orchestrator.dump().await.into_diagnostic()
    }

    async fn finish(mut self) -> Result<ScenarioReport> {
        self.settle().await;
        let dump = self.dump().await?;
        self.orchestrator.shutdown().await;
        Ok(ScenarioReport {
            events: self.log,
            dump,
        })
    }

    /// The live AP interface handle for a SoftAp manager, recovered
    /// from the dump's `name#id` rendering.
    async fn ap_handle(&self, id: ManagerId) -> Result<IfaceHandle> {
        let dump = self.dump().await?;
        let iface = dump
            .softaps
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.iface.clone())
            .ok_or_else(|| miette!("manager {id} has no live interface"))?;
        let (name, raw_id) = iface
            .rsplit_once('#')
            .ok_or_else(|| miette!("unparseable interface {iface}"))?;
        Ok(IfaceHandle {
            id: raw_id.parse().into_diagnostic()?,
            name: name.to_owned(),
            kind: IfaceKind::Ap,
        })
    }
}

fn requestor(tag: &str) -> Requestor {
    Requestor::internal(tag)
}

// ── Scenarios ────────────────────────────────────────────────────────

/// Toggle wifi on, show the primary manager, toggle off again.
async fn toggle_cycle(sim: &mut Sim) -> Result<()> {
    info!("enabling wifi");
    sim.settings.set_wifi_enabled(true);
    sim.settle().await;

    info!("disabling wifi");
    sim.settings.set_wifi_enabled(false);
    sim.settle().await;
    Ok(())
}

/// Hotspot and client coexistence interrupted by an emergency call.
/// The hotspot stops on entry and stays down after the call ends.
async fn hotspot_emergency(sim: &mut Sim) -> Result<()> {
    sim.settings.set_wifi_enabled(true);
    sim.settle().await;

    info!("starting tethered hotspot");
    sim.orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("modemux-demo"),
            requestor("demo"),
        )
        .await
        .into_diagnostic()?;
    sim.settle().await;

    info!("emergency call starts");
    sim.orchestrator
        .set_emergency_call_state(true)
        .await
        .into_diagnostic()?;
    sim.settle().await;

    info!("emergency call ends");
    sim.orchestrator
        .set_emergency_call_state(false)
        .await
        .into_diagnostic()?;
    sim.settle().await;
    Ok(())
}

/// Make-before-break: a secondary candidate validates L3 before the
/// old primary is demoted and torn down.
async fn handover(sim: &mut Sim) -> Result<()> {
    sim.settings.set_wifi_enabled(true);
    sim.settle().await;

    info!("requesting candidate manager");
    let candidate = sim
        .orchestrator
        .request_additional_client_manager(ClientRole::SecondaryTransient, requestor("handover"))
        .await
        .into_diagnostic()?;
    sim.settle().await;

    info!(%candidate, "candidate validated");
    sim.orchestrator
        .notify_l3_validated(candidate)
        .await
        .into_diagnostic()?;
    sim.settle().await;
    Ok(())
}

/// Daemon death triggers bounded recovery: teardown, delay, recreate.
async fn recovery(sim: &mut Sim, recovery_delay: Duration) -> Result<()> {
    sim.settings.set_wifi_enabled(true);
    sim.settle().await;

    sim.orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("modemux-demo"),
            requestor("demo"),
        )
        .await
        .into_diagnostic()?;
    sim.settle().await;

    info!("radio daemon dies");
    sim.fake.inject_daemon_death();
    sim.settle().await;

    // Wait out the recovery delay plus a margin for the recreate pass.
    tokio::time::sleep(recovery_delay + Duration::from_millis(200)).await;
    sim.settle().await;
    Ok(())
}

/// Admission control on a one-client hotspot with a blocked station.
async fn softap_admission(sim: &mut Sim) -> Result<()> {
    let blocked = MacAddress::new("AA:BB:CC:00:00:01");
    let first = MacAddress::new("AA:BB:CC:00:00:02");
    let overflow = MacAddress::new("AA:BB:CC:00:00:03");

    let mut config = SoftApConfig::new("modemux-admission");
    config.max_clients = Some(1);
    config.blocked_list = vec![blocked.clone()];

    let id = sim
        .orchestrator
        .start_soft_ap(SoftApRole::Tethered, config, requestor("admission"))
        .await
        .into_diagnostic()?;
    sim.settle().await;
    let handle = sim.ap_handle(id).await?;

    info!(%handle, "blocked station tries to join");
    sim.fake.inject_ap_station(&handle, blocked, true);
    sim.settle().await;

    info!(%handle, "first station joins");
    sim.fake.inject_ap_station(&handle, first, true);
    sim.settle().await;

    info!(%handle, "second station is over capacity");
    sim.fake.inject_ap_station(&handle, overflow, true);
    sim.settle().await;

    let evicted = sim.fake.disconnect_calls();
    info!(evictions = evicted.len(), "admission evictions recorded");
    Ok(())
}
