//! Human-readable rendering of orchestrator progress.

use colored::Colorize;

use convoy_core::Outcome;
use convoy_sync::{DeleteOutcome, Event, ProgressSink, UnitPhase};

/// Prints progress lines to stdout as events arrive.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    /// Suppress per-poll lines unless verbose.
    pub verbose: bool,
}

impl ConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressSink for ConsoleProgress {
    fn emit(&mut self, event: Event) {
        match event {
            Event::BootstrapApplied { path } => {
                println!("{} applied {}", "↑".cyan(), path.display());
            }
            Event::PreflightPolled { present, total } => {
                if self.verbose || present == total {
                    println!("  pre-flight: {present}/{total} units present");
                }
            }
            Event::PreflightFinished { missing } if !missing.is_empty() => {
                let names: Vec<_> = missing.iter().map(|m| m.as_str()).collect();
                println!(
                    "{} still missing after pre-flight: {}",
                    "!".yellow().bold(),
                    names.join(", ")
                );
            }
            Event::PreflightFinished { .. } => {}
            Event::UnitStarted {
                unit,
                position,
                total,
            } => {
                println!("{} [{position}/{total}] {}", "▶".cyan(), unit.as_str().bold());
            }
            Event::PhaseChanged { unit, phase } if self.verbose => {
                println!("  {unit}: {}", phase_label(phase));
            }
            Event::PhaseChanged { .. } => {}
            Event::SignalTimedOut { unit, signal } => {
                println!(
                    "  {} {unit}: readiness signal not met ({signal}); continuing",
                    "!".yellow().bold()
                );
            }
            Event::ReconciliationCleared { unit } => {
                println!("  {unit}: cleared failed reconciliation");
            }
            Event::GatesApproved {
                unit,
                namespace,
                count,
            } => {
                println!("  {unit}: approved {count} install gate(s) in {namespace}");
            }
            Event::HealthPolled {
                unit,
                sync,
                health,
                elapsed_secs,
            } => {
                if self.verbose {
                    println!("  {unit}: {sync}/{health} after {elapsed_secs}s");
                }
            }
            Event::UnitFinished { unit, outcome } => {
                println!("  {} {unit}", outcome_indicator(outcome));
            }
            Event::TeardownStep {
                stage,
                resource,
                outcome,
            } => {
                println!("  {} [{stage}] {resource}: {outcome}", delete_indicator(outcome));
            }
        }
    }
}

fn phase_label(phase: UnitPhase) -> &'static str {
    match phase {
        UnitPhase::NotFound => "waiting to appear",
        UnitPhase::AwaitingSignal => "awaiting readiness signal",
        UnitPhase::Converging => "converging",
        UnitPhase::Healthy => "healthy",
        UnitPhase::TimedOut => "timed out",
        UnitPhase::Skipped => "skipped",
    }
}

pub fn outcome_indicator(outcome: Outcome) -> String {
    match outcome {
        Outcome::Succeeded => "✓".green().bold().to_string(),
        Outcome::TimedOut => "⧗".yellow().bold().to_string(),
        Outcome::Skipped => "–".bright_black().bold().to_string(),
        Outcome::Pending => "·".bright_black().to_string(),
    }
}

fn delete_indicator(outcome: DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Deleted | DeleteOutcome::ForceDeleted => "✗".red().to_string(),
        DeleteOutcome::Stuck => "!".yellow().bold().to_string(),
        DeleteOutcome::Planned => "~".cyan().to_string(),
        DeleteOutcome::Disabled => "‖".cyan().to_string(),
        DeleteOutcome::AlreadyAbsent => "·".bright_black().to_string(),
    }
}
