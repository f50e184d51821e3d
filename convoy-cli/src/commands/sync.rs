//! `convoy sync` / `convoy sync-one`: staged sync.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{builder::FalseyValueParser, Args};

use convoy_core::Registry;
use convoy_sync::{pipeline, SyncOptions, SyncReport, SyncScope, SystemClock};

use super::{progress::ConsoleProgress, status, GlobalArgs};

/// Timeouts shared by `sync` and `sync-one`, in seconds.
#[derive(Args, Debug)]
pub struct SyncTiming {
    /// Default per-unit budget to become Synced + Healthy.
    #[arg(long, visible_alias = "timeout", env = "CONVOY_HEALTH_TIMEOUT", default_value_t = 300)]
    pub health_timeout: u64,

    /// Budget for each unit's remote representation to appear.
    #[arg(long, env = "CONVOY_EXISTENCE_TIMEOUT", default_value_t = 60)]
    pub existence_timeout: u64,

    /// Budget for the whole unit set to materialize before anything is triggered.
    #[arg(long, env = "CONVOY_PREFLIGHT_TIMEOUT", default_value_t = 300)]
    pub preflight_timeout: u64,

    /// Budget for a unit's readiness signal.
    #[arg(long, env = "CONVOY_READINESS_TIMEOUT", default_value_t = 300)]
    pub readiness_timeout: u64,

    #[arg(long, env = "CONVOY_POLL_INTERVAL", default_value_t = 5)]
    pub poll_interval: u64,

    /// Exit nonzero when any unit is missing at pre-flight or fails to converge.
    #[arg(long, env = "CONVOY_FAIL_FAST", value_parser = FalseyValueParser::new())]
    pub fail_fast: bool,
}

impl SyncTiming {
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            preflight_timeout: Duration::from_secs(self.preflight_timeout),
            existence_timeout: Duration::from_secs(self.existence_timeout),
            readiness_timeout: Duration::from_secs(self.readiness_timeout),
            health_timeout: Duration::from_secs(self.health_timeout),
            fail_fast: self.fail_fast,
        }
    }
}

/// Arguments for `convoy sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub timing: SyncTiming,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let registry = global.load_registry()?;
        execute(global, &registry, &self.timing, SyncScope::All)
    }
}

/// Arguments for `convoy sync-one`.
#[derive(Args, Debug)]
pub struct SyncOneArgs {
    /// Unit to sync.
    #[arg(long)]
    pub unit: String,

    #[command(flatten)]
    pub timing: SyncTiming,
}

impl SyncOneArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let registry = global.load_registry()?;
        registry.unit(&self.unit)?;
        execute(global, &registry, &self.timing, SyncScope::Unit(self.unit))
    }
}

fn execute(
    global: &GlobalArgs,
    registry: &Registry,
    timing: &SyncTiming,
    scope: SyncScope,
) -> Result<()> {
    let client = global.cluster_client()?;
    let mut progress = ConsoleProgress::new(global.verbose);
    let report = pipeline::run(
        registry,
        &client,
        &SystemClock,
        timing.options(),
        &scope,
        &mut progress,
    )
    .context("sync aborted")?;

    print_summary(&report);
    status::print_table(&convoy_sync::snapshot(&client, registry));
    Ok(())
}

fn print_summary(report: &SyncReport) {
    let took = report.finished_at - report.started_at;
    println!(
        "✓ sync finished in {}s: {} succeeded, {} skipped, {} timed out",
        took.num_seconds(),
        report.succeeded(),
        report.skipped(),
        report.timed_out(),
    );
    for attempt in &report.attempts {
        println!(
            "  {} {} ({}/{})",
            super::progress::outcome_indicator(attempt.outcome),
            attempt.unit,
            attempt.last_sync,
            attempt.last_health,
        );
    }
}
