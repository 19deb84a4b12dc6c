// ── Orchestrator configuration ──
//
// Tunables loaded once at startup (the binary layers a TOML file and
// MODEMUX_ env vars through figment). Durations are plain millisecond
// fields so the file format stays obvious.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Static configuration for one orchestrator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause between recovery teardown and manager recreation.
    pub recovery_delay_ms: u64,

    /// How many stopped managers to retain per kind for diagnostics.
    pub graveyard_depth: usize,

    /// Upper bound on the deferred-stop window protecting a VoWiFi
    /// session. Zero means tear down immediately, which is also the
    /// behavior whenever no VoWiFi signal is available.
    pub deferred_stop_timeout_ms: u64,

    /// Device policy: whether entering emergency mode also stops client
    /// managers (SoftAp managers always stop).
    pub stop_client_in_emergency: bool,

    pub softap: SoftApDefaults,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            recovery_delay_ms: 2_000,
            graveyard_depth: 3,
            deferred_stop_timeout_ms: 0,
            stop_client_in_emergency: false,
            softap: SoftApDefaults::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    pub fn deferred_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.deferred_stop_timeout_ms)
    }
}

/// Device-policy defaults applied to SoftAp configurations that leave
/// the corresponding fields unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftApDefaults {
    /// Configured client ceiling when the caller does not set one. The
    /// effective limit is always `min(hardware, configured)`.
    pub max_clients: u16,

    /// No-station auto-shutdown delay.
    pub shutdown_timeout_ms: u64,
    pub shutdown_timeout_enabled: bool,
}

impl Default for SoftApDefaults {
    fn default() -> Self {
        Self {
            max_clients: 10,
            shutdown_timeout_ms: 600_000,
            shutdown_timeout_enabled: true,
        }
    }
}

impl SoftApDefaults {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = OrchestratorConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: OrchestratorConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: OrchestratorConfig = toml::from_str("recovery_delay_ms = 50").unwrap();
        assert_eq!(cfg.recovery_delay(), Duration::from_millis(50));
        assert_eq!(cfg.graveyard_depth, 3);
        assert!(cfg.softap.shutdown_timeout_enabled);
    }
}
