//! Clap derive structures for the `modemux` CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// modemux -- drive the mode-lifecycle orchestrator against a fake radio
#[derive(Debug, Parser)]
#[command(
    name = "modemux",
    version,
    about = "Demo and diagnostics CLI for the modemux orchestrator",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Configuration file (TOML); MODEMUX_* env vars override it
    #[arg(long, short = 'c', env = "MODEMUX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format for dumps
    #[arg(long, short = 'o', default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scripted scenario against a FakeRadio and print the result
    Simulate {
        #[arg(value_enum)]
        scenario: Scenario,
    },
    /// Print the effective configuration after file and env layering
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Scenario {
    /// Toggle wifi on, inspect, toggle off
    ToggleCycle,
    /// Hotspot + client coexistence interrupted by an emergency call
    HotspotEmergency,
    /// Make-before-break primary handover
    Handover,
    /// Recovery restart after a simulated daemon death
    Recovery,
    /// SoftAp admission control against a small client ceiling
    SoftapAdmission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    Text,
    /// Pretty-printed JSON
    Json,
}
