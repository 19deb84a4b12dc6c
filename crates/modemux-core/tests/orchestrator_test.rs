#![allow(clippy::unwrap_used)]
// End-to-end orchestrator tests against FakeRadio, with paused time for
// everything timer-driven.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use modemux_core::manager::client::ClientState;
use modemux_core::orchestrator::OrchestratorState;
use modemux_core::{
    ClientRole, LegacyBroadcast, ManagerKind, ModeEvent, Orchestrator, OrchestratorConfig,
    Settings, SettingsStore, SoftApConfig, SoftApRole, SoftApStopScope,
};
use modemux_hal::{FakeRadio, MacAddress, RadioHal, Requestor, RequestorPriority};

// ── Helpers ─────────────────────────────────────────────────────────

struct Fixture {
    orchestrator: Orchestrator,
    fake: Arc<FakeRadio>,
    settings: SettingsStore,
    events: broadcast::Receiver<Arc<ModeEvent>>,
}

fn fixture(initial: Settings, config: OrchestratorConfig) -> Fixture {
    let (fake, hal_events) = FakeRadio::new();
    let fake = Arc::new(fake);
    let hal: Arc<dyn RadioHal> = Arc::clone(&fake) as Arc<dyn RadioHal>;
    let settings = SettingsStore::new(initial);
    let orchestrator = Orchestrator::start(hal, hal_events, &settings, config);
    let events = orchestrator.events();
    Fixture {
        orchestrator,
        fake,
        settings,
        events,
    }
}

fn requestor() -> Requestor {
    Requestor::new(1000, "test", RequestorPriority::Foreground)
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<Arc<ModeEvent>>, mut pred: F) -> Arc<ModeEvent>
where
    F: FnMut(&ModeEvent) -> bool,
{
    loop {
        let event = timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if pred(&event) {
            return event;
        }
    }
}

async fn wait_for_state(
    rx: &mut broadcast::Receiver<Arc<ModeEvent>>,
    state: OrchestratorState,
) -> Arc<ModeEvent> {
    wait_for(rx, |e| matches!(e, ModeEvent::StateChanged(s) if *s == state)).await
}

// ── Scenario: toggle on, toggle off ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn toggle_on_creates_one_primary_then_toggle_off_disables() {
    let mut fx = fixture(Settings::default(), OrchestratorConfig::default());

    fx.settings.set_wifi_enabled(true);
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.state, OrchestratorState::Enabled);
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.clients[0].role.as_deref(), Some("Primary"));
    assert_eq!(dump.clients[0].state, ClientState::Connect.to_string());

    // Toggle off: zero-length deferred-stop window, straight to Disabled.
    fx.settings.set_wifi_enabled(false);
    wait_for_state(&mut fx.events, OrchestratorState::Disabled).await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert!(dump.clients.is_empty());
    assert_eq!(dump.graveyard.len(), 1);
    assert_eq!(dump.graveyard[0].kind, ManagerKind::Client);

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn scan_always_lands_in_scan_only() {
    let mut fx = fixture(
        Settings {
            scan_always_available: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );

    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ManagerAdded {
                kind: ManagerKind::Client,
                ..
            }
        )
    })
    .await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients[0].role.as_deref(), Some("ScanOnly"));
    assert_eq!(dump.clients[0].state, ClientState::ScanOnly.to_string());

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn demotion_to_scan_only_delivers_disabling_broadcast() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            scan_always_available: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    // Toggle off with scan-always on: the Primary demotes in place.
    fx.settings.set_wifi_enabled(false);
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::LegacyBroadcast {
                broadcast: LegacyBroadcast::Disabling,
                ..
            }
        )
    })
    .await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.clients[0].role.as_deref(), Some("ScanOnly"));

    // Nothing was buffered, so re-promotion must not replay a stale
    // Disabling.
    fx.settings.set_wifi_enabled(true);
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;
    let next = wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::LegacyBroadcast { .. })
    })
    .await;
    assert!(
        matches!(
            &*next,
            ModeEvent::LegacyBroadcast {
                broadcast: LegacyBroadcast::ConnectivityState {
                    connected: true,
                    ..
                },
                ..
            }
        ),
        "expected a fresh connectivity broadcast, got {next:?}"
    );

    fx.orchestrator.shutdown().await;
}

// ── Scenario: hotspot + emergency call ──────────────────────────────

#[tokio::test(start_paused = true)]
async fn emergency_stops_softap_but_not_client_and_never_restores() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );

    let ap_id = fx
        .orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("emergency-test"),
            requestor(),
        )
        .await
        .unwrap();

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.softaps.len(), 1);

    fx.orchestrator.set_emergency_call_state(true).await.unwrap();
    wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::ManagerRemoved { id, .. } if *id == ap_id)
    })
    .await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert!(dump.softaps.is_empty());
    assert_eq!(dump.clients.len(), 1, "client survives per device policy");
    assert!(dump.emergency_active);

    // New hotspot requests are refused while the overlay is up.
    let refused = fx
        .orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("nope"),
            requestor(),
        )
        .await;
    assert!(refused.is_err());

    // Leaving emergency mode does not resurrect the hotspot.
    fx.orchestrator
        .set_emergency_call_state(false)
        .await
        .unwrap();
    let dump = fx.orchestrator.dump().await.unwrap();
    assert!(dump.softaps.is_empty());
    assert!(!dump.emergency_active);
    assert_eq!(dump.clients.len(), 1);

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emergency_swallows_l3_validation_and_release() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;
    let primary = fx.orchestrator.dump().await.unwrap().clients[0].id;
    let candidate = fx
        .orchestrator
        .request_additional_client_manager(ClientRole::SecondaryTransient, requestor())
        .await
        .unwrap();

    fx.orchestrator
        .set_emergency_callback_mode(true)
        .await
        .unwrap();
    fx.orchestrator.notify_l3_validated(candidate).await.unwrap();
    fx.orchestrator.release_client_manager(candidate).await.unwrap();

    let dump = fx.orchestrator.dump().await.unwrap();
    assert!(dump.emergency_active);
    assert_eq!(dump.clients.len(), 2, "release is held back by the overlay");
    let primary_role = dump
        .clients
        .iter()
        .find(|c| c.id == primary)
        .unwrap()
        .role
        .clone();
    assert_eq!(
        primary_role.as_deref(),
        Some("Primary"),
        "no handover while the overlay is up"
    );

    // Overlay lifted: validation drives the handover normally.
    fx.orchestrator
        .set_emergency_callback_mode(false)
        .await
        .unwrap();
    while fx.events.try_recv().is_ok() {}
    fx.orchestrator.notify_l3_validated(candidate).await.unwrap();
    wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::PrimaryChanged { new: Some(id), .. } if *id == candidate)
    })
    .await;

    fx.orchestrator.shutdown().await;
}

// ── Scenario: make-before-break ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn make_before_break_demotes_old_primary_before_promoting_new() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;
    let old_primary = fx.orchestrator.dump().await.unwrap().clients[0].id;

    let candidate = fx
        .orchestrator
        .request_additional_client_manager(ClientRole::SecondaryTransient, requestor())
        .await
        .unwrap();
    assert_ne!(candidate, old_primary);

    // Drain everything already on the bus so the ordering check below
    // only sees the handover itself.
    while fx.events.try_recv().is_ok() {}

    fx.orchestrator.notify_l3_validated(candidate).await.unwrap();

    let first = wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::ClientRoleChanged { .. })
    })
    .await;
    assert!(
        matches!(
            &*first,
            ModeEvent::ClientRoleChanged { id, new: ClientRole::SecondaryTransient, .. }
                if *id == old_primary
        ),
        "old primary must demote first, got {first:?}"
    );

    let second = wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::ClientRoleChanged { .. })
    })
    .await;
    assert!(
        matches!(
            &*second,
            ModeEvent::ClientRoleChanged { id, new: ClientRole::Primary, .. }
                if *id == candidate
        ),
        "candidate promotes second, got {second:?}"
    );

    let dump = fx.orchestrator.dump().await.unwrap();
    let roles: Vec<Option<String>> = dump.clients.iter().map(|c| c.role.clone()).collect();
    assert_eq!(
        roles
            .iter()
            .filter(|r| r.as_deref() == Some("Primary"))
            .count(),
        1
    );

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn additional_manager_falls_back_to_primary_when_capability_denies() {
    let fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    // Only one station interface: the settings-owned primary has it.
    fx.fake.set_station_budget(1);

    let dump = fx.orchestrator.dump().await.unwrap();
    let primary = dump.clients[0].id;

    let granted = fx
        .orchestrator
        .request_additional_client_manager(ClientRole::LocalOnly, requestor())
        .await
        .unwrap();
    assert_eq!(granted, primary, "degrades to the existing primary");
    assert_eq!(fx.orchestrator.dump().await.unwrap().clients.len(), 1);

    fx.orchestrator.shutdown().await;
}

// ── Scenario: deferred stop / VoWiFi ────────────────────────────────

#[tokio::test(start_paused = true)]
async fn vowifi_defers_toggle_off_until_release() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig {
            deferred_stop_timeout_ms: 10_000,
            ..OrchestratorConfig::default()
        },
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    fx.orchestrator.set_vowifi_active(true).await.unwrap();
    fx.settings.set_wifi_enabled(false);
    // Let the settings change reach the queue before inspecting.
    tokio::time::sleep(Duration::from_millis(1)).await;

    // The manager parks in the deferral window instead of stopping.
    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.clients[0].state, "DeferringStop");

    fx.orchestrator.set_vowifi_active(false).await.unwrap();
    wait_for_state(&mut fx.events, OrchestratorState::Disabled).await;

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn vowifi_deferral_expires_on_timeout() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig {
            deferred_stop_timeout_ms: 10_000,
            ..OrchestratorConfig::default()
        },
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    fx.orchestrator.set_vowifi_active(true).await.unwrap();
    fx.settings.set_wifi_enabled(false);

    // Paused time: the window timer auto-advances once we await.
    wait_for_state(&mut fx.events, OrchestratorState::Disabled).await;

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn toggle_on_during_deferral_window_keeps_wifi_enabled() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig {
            deferred_stop_timeout_ms: 10_000,
            ..OrchestratorConfig::default()
        },
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    fx.orchestrator.set_vowifi_active(true).await.unwrap();
    fx.settings.set_wifi_enabled(false);
    tokio::time::sleep(Duration::from_millis(1)).await;
    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients[0].state, "DeferringStop");

    // Toggle back on inside the window, then let the stale timer land.
    fx.settings.set_wifi_enabled(true);
    tokio::time::sleep(Duration::from_secs(30)).await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.state, OrchestratorState::Enabled);
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.clients[0].state, "Connect");
    assert_eq!(dump.clients[0].role.as_deref(), Some("Primary"));

    fx.orchestrator.shutdown().await;
}

// ── Scenario: recovery ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn recovery_restart_recreates_snapshot() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;
    fx.orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("before-recovery"),
            requestor(),
        )
        .await
        .unwrap();

    fx.orchestrator.recovery_restart("test").await.unwrap();
    wait_for_state(&mut fx.events, OrchestratorState::Disabled).await;

    // After the recovery delay both managers come back.
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ManagerAdded {
                kind: ManagerKind::SoftAp,
                ..
            }
        )
    })
    .await;
    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.softaps.len(), 1);
    assert_eq!(dump.softaps[0].ssid, "before-recovery");

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn recovery_from_empty_live_set_is_idempotent() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    // Two restarts back to back: two timers, one final live set.
    fx.orchestrator.recovery_restart("first").await.unwrap();
    fx.orchestrator.recovery_restart("second").await.unwrap();

    wait_for_state(&mut fx.events, OrchestratorState::Disabled).await;
    wait_for_state(&mut fx.events, OrchestratorState::Enabled).await;

    // Let the second timer land too, then check for duplicates.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients.len(), 1, "no duplicate managers");
    assert_eq!(dump.clients[0].role.as_deref(), Some("Primary"));

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn daemon_death_triggers_recovery() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;

    fx.fake.inject_daemon_death();

    wait_for_state(&mut fx.events, OrchestratorState::Disabled).await;
    wait_for_state(&mut fx.events, OrchestratorState::Enabled).await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.clients.len(), 1);
    assert_eq!(dump.clients[0].role.as_deref(), Some("Primary"));

    fx.orchestrator.shutdown().await;
}

// ── Scenario: SoftAp stations through the HAL ───────────────────────

#[tokio::test(start_paused = true)]
async fn softap_station_events_flow_through_admission() {
    let mut fx = fixture(Settings::default(), OrchestratorConfig::default());

    let mut config = SoftApConfig::new("station-test");
    config.max_clients = Some(1);
    fx.orchestrator
        .start_soft_ap(SoftApRole::Tethered, config, requestor())
        .await
        .unwrap();

    let dump = fx.orchestrator.dump().await.unwrap();
    let iface = dump.softaps[0].iface.clone().unwrap();
    // FakeRadio handle: name "ap<id>"; we need the handle to inject.
    let handle = modemux_hal::IfaceHandle {
        id: iface
            .rsplit('#')
            .next()
            .unwrap()
            .parse()
            .unwrap(),
        name: iface.split('#').next().unwrap().to_owned(),
        kind: modemux_hal::IfaceKind::Ap,
    };

    fx.fake
        .inject_ap_station(&handle, MacAddress::new("aa:bb:cc:00:00:01"), true);
    wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::SoftApStationsChanged { connected: 1, .. })
    })
    .await;

    // Over the configured ceiling: rejected with a forced disconnect.
    fx.fake
        .inject_ap_station(&handle, MacAddress::new("aa:bb:cc:00:00:02"), true);
    fx.fake
        .inject_ap_station(&handle, MacAddress::new("aa:bb:cc:00:00:01"), false);
    wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::SoftApStationsChanged { connected: 0, .. })
    })
    .await;
    assert_eq!(fx.fake.disconnect_calls().len(), 1);

    fx.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn softap_idle_timeout_stops_the_hotspot() {
    let mut fx = fixture(Settings::default(), OrchestratorConfig::default());

    let mut config = SoftApConfig::new("idle-test");
    config.shutdown_timeout_ms = Some(5_000);
    let id = fx
        .orchestrator
        .start_soft_ap(SoftApRole::Tethered, config, requestor())
        .await
        .unwrap();

    // Nobody connects; the no-station timer fires under paused time.
    wait_for(&mut fx.events, |e| {
        matches!(e, ModeEvent::ManagerRemoved { id: gone, .. } if *gone == id)
    })
    .await;

    let dump = fx.orchestrator.dump().await.unwrap();
    assert_eq!(dump.state, OrchestratorState::Disabled);
    assert_eq!(dump.graveyard.len(), 1);

    fx.orchestrator.shutdown().await;
}

// ── Scenario: hotspot start while radio is off ──────────────────────

#[tokio::test(start_paused = true)]
async fn softap_start_enables_from_disabled() {
    let fx = fixture(Settings::default(), OrchestratorConfig::default());

    let mut state = fx.orchestrator.state();
    assert_eq!(*state.borrow_and_update(), OrchestratorState::Disabled);

    fx.orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("solo-ap"),
            requestor(),
        )
        .await
        .unwrap();
    assert_eq!(*state.borrow_and_update(), OrchestratorState::Enabled);

    fx.orchestrator
        .stop_soft_ap(SoftApStopScope::Tethered)
        .await
        .unwrap();
    assert_eq!(*state.borrow_and_update(), OrchestratorState::Disabled);

    fx.orchestrator.shutdown().await;
}

// ── Dump snapshot ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dump_renders_stably() {
    let mut fx = fixture(
        Settings {
            wifi_enabled: true,
            ..Settings::default()
        },
        OrchestratorConfig::default(),
    );
    wait_for(&mut fx.events, |e| {
        matches!(
            e,
            ModeEvent::ClientRoleChanged {
                new: ClientRole::Primary,
                ..
            }
        )
    })
    .await;
    fx.orchestrator
        .start_soft_ap(
            SoftApRole::Tethered,
            SoftApConfig::new("dump-ap"),
            requestor(),
        )
        .await
        .unwrap();

    let dump = fx.orchestrator.dump().await.unwrap();
    insta::assert_snapshot!(dump.to_string());

    fx.orchestrator.shutdown().await;
}
