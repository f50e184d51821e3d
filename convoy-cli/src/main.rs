//! Convoy: staged sync of a GitOps-managed operator stack.
//!
//! # Usage
//!
//! ```text
//! convoy sync [--timeout SECONDS] [--fail-fast]
//! convoy sync-one --unit <name>
//! convoy teardown [--dry-run] [--yes]
//! convoy status [--json]
//! ```
//!
//! Global: `--registry <path>` (`CONVOY_REGISTRY`), `--cluster-cli <bin>`
//! (`CONVOY_CLUSTER_CLI`), `-v/--verbose`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    status::StatusArgs,
    sync::{SyncArgs, SyncOneArgs},
    teardown::TeardownArgs,
    GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "convoy",
    version,
    about = "Dependency-ordered sync and teardown of GitOps-managed units",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync every unit in dependency order.
    Sync(SyncArgs),

    /// Sync a single named unit.
    SyncOne(SyncOneArgs),

    /// Delete every unit in reverse dependency order, then sweep leftovers.
    Teardown(TeardownArgs),

    /// Show the unit × {sync, health} table.
    ///
    /// Exits 0 even when the cluster is unreachable, in which case every
    /// state is Unknown. An unreadable registry exits 1.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::SyncOne(args) => args.run(&cli.global),
        Commands::Teardown(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
