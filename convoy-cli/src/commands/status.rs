//! `convoy status`: unit × {sync, health} table.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use convoy_core::{HealthState, Registry, SyncState};
use convoy_sync::{snapshot, unobserved, UnitStatus};

use super::GlobalArgs;

/// Arguments for `convoy status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let registry = global.load_registry()?;
        let rows = collect(global, &registry);
        if self.json {
            return print_json(rows);
        }
        print_table(&rows);
        Ok(())
    }
}

/// Fresh snapshot, or all-unknown rows when no cluster CLI is usable.
pub fn collect(global: &GlobalArgs, registry: &Registry) -> Vec<UnitStatus> {
    match global.cluster_client() {
        Ok(client) => snapshot(&client, registry),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "cluster unreachable; status unknown");
            unobserved(registry)
        }
    }
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    units: Vec<UnitStatus>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    units: usize,
    converged: usize,
    missing: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "unit")]
    unit: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "sync")]
    sync: String,
    #[tabled(rename = "health")]
    health: String,
    #[tabled(rename = "last operation")]
    operation: String,
}

fn print_json(rows: Vec<UnitStatus>) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            units: rows.len(),
            converged: converged(&rows),
            missing: rows.iter().filter(|r| !r.present).count(),
        },
        units: rows,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

pub fn print_table(rows: &[UnitStatus]) {
    println!(
        "Convoy v{} | {} units | {} synced+healthy",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        converged(rows),
    );
    if rows.is_empty() {
        println!("No units registered.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .iter()
        .map(|row| StatusTableRow {
            unit: row.unit.to_string(),
            kind: row.kind.to_string(),
            sync: sync_label(row.sync),
            health: health_label(row.health),
            operation: if row.operation.is_empty() {
                "-".to_string()
            } else {
                row.operation.clone()
            },
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn converged(rows: &[UnitStatus]) -> usize {
    rows.iter()
        .filter(|r| r.sync == SyncState::Synced && r.health == HealthState::Healthy)
        .count()
}

fn sync_label(sync: SyncState) -> String {
    match sync {
        SyncState::Synced => sync.to_string().green().to_string(),
        SyncState::OutOfSync => sync.to_string().yellow().to_string(),
        SyncState::Unknown => sync.to_string().bright_black().to_string(),
    }
}

fn health_label(health: HealthState) -> String {
    match health {
        HealthState::Healthy => health.to_string().green().bold().to_string(),
        HealthState::Progressing => health.to_string().cyan().to_string(),
        HealthState::Degraded => health.to_string().red().bold().to_string(),
        HealthState::Missing => health.to_string().magenta().to_string(),
        HealthState::Unknown => health.to_string().bright_black().to_string(),
    }
}
