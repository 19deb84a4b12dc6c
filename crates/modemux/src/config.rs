//! Configuration loading: defaults layered under a TOML file and
//! `MODEMUX_` environment overrides.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use miette::{IntoDiagnostic, Result, WrapErr};

use modemux_core::OrchestratorConfig;

/// Canonical config file location when `--config` is not given.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "modemux").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the orchestrator configuration. A missing file is fine; the
/// defaults cover everything.
pub fn load(explicit: Option<&Path>) -> Result<OrchestratorConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let mut figment = Figment::new().merge(Serialized::defaults(OrchestratorConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed("MODEMUX_").split("__"))
        .extract()
        .into_diagnostic()
        .wrap_err("invalid configuration")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load(Some(Path::new("/nonexistent/modemux.toml"))).unwrap();
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recovery_delay_ms = 25\n[softap]\nmax_clients = 4").unwrap();
        let cfg = load(Some(file.path())).unwrap();
        assert_eq!(cfg.recovery_delay_ms, 25);
        assert_eq!(cfg.softap.max_clients, 4);
        assert_eq!(cfg.graveyard_depth, OrchestratorConfig::default().graveyard_depth);
    }
}
