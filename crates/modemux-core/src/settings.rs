// ── Persisted settings snapshot ──
//
// The three externally persisted switches the orchestrator derives its
// startup state from. Storage itself lives outside the core; this module
// only holds the observable snapshot.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::role::ClientRole;

/// Snapshot of the persisted radio switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The user-facing wifi toggle.
    pub wifi_enabled: bool,
    pub airplane_mode: bool,
    /// Background scanning permitted while the toggle is off.
    pub scan_always_available: bool,
}

impl Settings {
    /// The client role these settings call for, if any.
    ///
    /// Toggle on wins over scan-always; airplane mode suppresses both.
    pub fn derived_client_role(&self) -> Option<ClientRole> {
        if self.airplane_mode {
            None
        } else if self.wifi_enabled {
            Some(ClientRole::Primary)
        } else if self.scan_always_available {
            Some(ClientRole::ScanOnly)
        } else {
            None
        }
    }
}

/// Observable settings store. Writers call the setters; the orchestrator
/// holds a receiver and re-evaluates on change notification.
#[derive(Debug)]
pub struct SettingsStore {
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn snapshot(&self) -> Settings {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn set_wifi_enabled(&self, on: bool) {
        self.tx.send_modify(|s| s.wifi_enabled = on);
    }

    pub fn set_airplane_mode(&self, on: bool) {
        self.tx.send_modify(|s| s.airplane_mode = on);
    }

    pub fn set_scan_always_available(&self, on: bool) {
        self.tx.send_modify(|s| s.scan_always_available = on);
    }
}
