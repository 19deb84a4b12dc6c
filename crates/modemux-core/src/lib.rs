//! Mode-lifecycle orchestration for multi-interface radio devices.
//!
//! This crate decides which logical radio roles should be running at any
//! moment and drives the per-interface state machines that realize them:
//!
//! - **[`Orchestrator`]** — Central actor owning the live manager set.
//!   [`Orchestrator::start()`] spawns one run task that serializes every
//!   command, HAL event, timer firing, and settings change; external
//!   callers hold a cheap clone of the handle and receive results over
//!   oneshot replies.
//!
//! - **Mode Managers** ([`manager`]) — One per hardware interface. The
//!   client manager ([`manager::client`]) switches between scan-only and
//!   full-connect behavior with a deferred-stop window protecting VoWiFi
//!   sessions; the SoftAp manager ([`manager::softap`]) runs the hotspot
//!   start pipeline, station admission, and the no-station idle timer.
//!
//! - **Satellites** — The make-before-break coordinator ([`handover`])
//!   executes the two-step primary handover; the broadcast queue
//!   ([`broadcast`]) buffers legacy notifications for non-primary
//!   managers until promotion.
//!
//! - **[`Graveyard`]** — Bounded retention of recently stopped managers,
//!   surfaced by [`Orchestrator::dump()`].
//!
//! The hardware boundary is the `RadioHal` trait from `modemux-hal`;
//! tests and the demo binary drive everything through its `FakeRadio`.

pub mod broadcast;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod graveyard;
pub mod handover;
pub mod manager;
pub mod orchestrator;
pub mod role;
pub mod settings;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult, SoftApStopScope};
pub use config::{OrchestratorConfig, SoftApDefaults};
pub use error::{CoreError, SoftApStartFailure};
pub use events::{LegacyBroadcast, ModeEvent};
pub use graveyard::{Graveyard, Tombstone};
pub use manager::softap::SoftApConfig;
pub use manager::{ManagerId, ManagerKind};
pub use orchestrator::{DumpReport, Orchestrator, OrchestratorState};
pub use role::{ClientRole, SoftApRole};
pub use settings::{Settings, SettingsStore};
