//! Output formatting: text tables or JSON.
//!
//! Text rendering uses `tabled` for the manager and graveyard tables
//! with colored section headers; JSON serializes the dump via serde.

use std::fmt::Write as _;
use std::io::{self, IsTerminal};

use miette::{IntoDiagnostic, Result};
use owo_colors::{OwoColorize, Style as TextStyle};
use tabled::{Table, Tabled, settings::Style};

use modemux_core::{DumpReport, ModeEvent};

use crate::cli::OutputFormat;

// ── Dump rendering ───────────────────────────────────────────────────

#[derive(Tabled)]
struct ClientRow {
    id: String,
    state: String,
    role: String,
    target: String,
    iface: String,
}

#[derive(Tabled)]
struct SoftApRow {
    id: String,
    state: String,
    role: String,
    ssid: String,
    stations: usize,
    iface: String,
}

#[derive(Tabled)]
struct TombstoneRow {
    id: String,
    kind: String,
    role: String,
    reason: String,
    buried: String,
}

/// Render a dump in the chosen format.
pub fn render_dump(format: OutputFormat, dump: &DumpReport) -> Result<String> {
    match format {
        OutputFormat::Json => dump.to_json().into_diagnostic(),
        OutputFormat::Text => Ok(render_dump_text(dump)),
    }
}

/// Colors only when stdout is a terminal and `NO_COLOR` is unset.
fn should_color() -> bool {
    io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err()
}

fn render_dump_text(dump: &DumpReport) -> String {
    let (label, header) = if should_color() {
        (TextStyle::new().bold(), TextStyle::new().cyan().bold())
    } else {
        (TextStyle::new(), TextStyle::new())
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} (emergency: {})",
        "state:".style(label),
        dump.state,
        dump.emergency_active
    );
    let _ = writeln!(
        out,
        "{} {}",
        "start failures:".style(label),
        dump.start_failures
    );

    let _ = writeln!(out, "\n{}", "client managers".style(header));
    if dump.clients.is_empty() {
        let _ = writeln!(out, "  (none)");
    } else {
        let rows: Vec<ClientRow> = dump
            .clients
            .iter()
            .map(|c| ClientRow {
                id: c.id.to_string(),
                state: c.state.clone(),
                role: c.role.clone().unwrap_or_else(|| "-".into()),
                target: c.target_role.clone().unwrap_or_else(|| "-".into()),
                iface: c.iface.clone().unwrap_or_else(|| "-".into()),
            })
            .collect();
        let _ = writeln!(out, "{}", render_table(&rows));
    }

    let _ = writeln!(out, "\n{}", "softap managers".style(header));
    if dump.softaps.is_empty() {
        let _ = writeln!(out, "  (none)");
    } else {
        let rows: Vec<SoftApRow> = dump
            .softaps
            .iter()
            .map(|s| SoftApRow {
                id: s.id.to_string(),
                state: s.state.clone(),
                role: s.role.clone(),
                ssid: s.ssid.clone(),
                stations: s.connected_stations,
                iface: s.iface.clone().unwrap_or_else(|| "-".into()),
            })
            .collect();
        let _ = writeln!(out, "{}", render_table(&rows));
    }

    if !dump.graveyard.is_empty() {
        let _ = writeln!(out, "\n{}", "graveyard".style(header));
        let rows: Vec<TombstoneRow> = dump
            .graveyard
            .iter()
            .map(|t| TombstoneRow {
                id: t.id.to_string(),
                kind: t.kind.to_string(),
                role: t.role.clone().unwrap_or_else(|| "-".into()),
                reason: t.stop_reason.clone(),
                buried: t.buried_at.to_rfc3339(),
            })
            .collect();
        let _ = writeln!(out, "{}", render_table(&rows));
    }

    out
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

// ── Event log rendering ──────────────────────────────────────────────

/// One human-readable line per bus event, for the scenario logs.
pub fn format_event(event: &ModeEvent) -> String {
    match event {
        ModeEvent::ManagerAdded { id, kind } => format!("manager added      {id} ({kind})"),
        ModeEvent::ManagerRemoved { id, kind } => format!("manager removed    {id} ({kind})"),
        ModeEvent::ClientRoleChanged { id, old, new } => match old {
            Some(old) => format!("role changed       {id}: {old} -> {new}"),
            None => format!("role assigned      {id}: {new}"),
        },
        ModeEvent::PrimaryChanged { old, new } => format!(
            "primary changed    {} -> {}",
            old.map_or_else(|| "-".into(), |id| id.to_string()),
            new.map_or_else(|| "-".into(), |id| id.to_string()),
        ),
        ModeEvent::L3Validated { id } => format!("l3 validated       {id}"),
        ModeEvent::StateChanged(state) => format!("state changed      {state}"),
        ModeEvent::LegacyBroadcast { id, broadcast } => {
            format!("broadcast          {id}: {broadcast:?}")
        }
        ModeEvent::StartFailed { id, kind, reason } => {
            format!("start failed       {id} ({kind}): {reason}")
        }
        ModeEvent::SoftApStationsChanged { id, connected } => {
            format!("stations changed   {id}: {connected} connected")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modemux_core::{ManagerId, ManagerKind};

    #[test]
    fn event_lines_name_the_manager() {
        let line = format_event(&ModeEvent::ManagerAdded {
            id: ManagerId(3),
            kind: ManagerKind::Client,
        });
        assert!(line.contains("mm3"));
        assert!(line.contains("Client"));
    }
}
