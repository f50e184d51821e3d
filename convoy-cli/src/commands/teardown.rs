//! `convoy teardown`: reverse-order cascade deletion.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{builder::FalseyValueParser, Args};
use tabled::{settings::Style, Table, Tabled};

use convoy_core::Registry;
use convoy_sync::{pipeline, DeleteOutcome, SystemClock, TeardownOptions, TeardownReport};

use super::{progress::ConsoleProgress, status, GlobalArgs};

/// Arguments for `convoy teardown`.
#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Print intended deletions without mutating anything.
    #[arg(long, env = "CONVOY_DRY_RUN", value_parser = FalseyValueParser::new())]
    pub dry_run: bool,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y', env = "CONVOY_YES", value_parser = FalseyValueParser::new())]
    pub yes: bool,

    /// Seconds to wait for each resource to disappear before forcing it.
    #[arg(long, env = "CONVOY_DELETE_TIMEOUT", default_value_t = 300)]
    pub delete_timeout: u64,

    #[arg(long, env = "CONVOY_POLL_INTERVAL", default_value_t = 5)]
    pub poll_interval: u64,
}

impl TeardownArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let registry = global.load_registry()?;

        if !self.dry_run && !self.yes && !confirm(&registry)? {
            println!("Teardown aborted; nothing was changed.");
            return Ok(());
        }

        let client = global.cluster_client()?;
        let mut progress = ConsoleProgress::new(global.verbose);
        let outcome = pipeline::teardown(
            &registry,
            &client,
            &SystemClock,
            self.options(),
            self.dry_run,
            &mut progress,
        );

        if self.dry_run {
            println!("[dry-run] {} planned action(s):", outcome.planned.len());
            for action in &outcome.planned {
                println!("  ~  {action}");
            }
        }
        print_report(&outcome.report);
        status::print_table(&convoy_sync::snapshot(&client, &registry));
        Ok(())
    }

    fn options(&self) -> TeardownOptions {
        let delete_timeout = Duration::from_secs(self.delete_timeout);
        TeardownOptions {
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            delete_timeout,
            namespace_timeout: delete_timeout,
            ..Default::default()
        }
    }
}

fn confirm(registry: &Registry) -> Result<bool> {
    print!(
        "This deletes {} unit(s) and {} namespace(s). Continue? [y/N] ",
        registry.cleanup_order().len(),
        registry.managed_namespaces().len(),
    );
    io::stdout().flush().context("failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[derive(Tabled)]
struct TeardownTableRow {
    #[tabled(rename = "stage")]
    stage: String,
    #[tabled(rename = "resource")]
    resource: String,
    #[tabled(rename = "outcome")]
    outcome: String,
}

fn print_report(report: &TeardownReport) {
    println!(
        "Teardown: {} deleted, {} forced, {} absent, {} stuck",
        report.count(DeleteOutcome::Deleted),
        report.count(DeleteOutcome::ForceDeleted),
        report.count(DeleteOutcome::AlreadyAbsent),
        report.count(DeleteOutcome::Stuck),
    );
    let rows: Vec<TeardownTableRow> = report
        .entries
        .iter()
        .filter(|e| e.outcome != DeleteOutcome::AlreadyAbsent)
        .map(|e| TeardownTableRow {
            stage: e.stage.to_string(),
            resource: e.resource.to_string(),
            outcome: e.outcome.to_string(),
        })
        .collect();
    if rows.is_empty() {
        return;
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
