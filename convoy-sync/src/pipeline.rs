//! Shared entrypoints used by the CLI: wire the executor and run an
//! orchestrator.

use convoy_cluster::{ClusterClient, LiveExecutor, LogOnlyExecutor, PlannedAction};
use convoy_core::Registry;

use crate::clock::Clock;
use crate::error::SyncError;
use crate::events::ProgressSink;
use crate::orchestrator::{SyncOptions, SyncOrchestrator, SyncReport, SyncScope};
use crate::teardown::{TeardownOptions, TeardownOrchestrator, TeardownReport};

/// Run a staged sync for `scope` against the live cluster.
pub fn run(
    registry: &Registry,
    client: &dyn ClusterClient,
    clock: &dyn Clock,
    options: SyncOptions,
    scope: &SyncScope,
    sink: &mut dyn ProgressSink,
) -> Result<SyncReport, SyncError> {
    let executor = LiveExecutor::new(client);
    SyncOrchestrator::new(registry, client, &executor, clock, options).run(scope, sink)
}

/// Result of a teardown run. `planned` is only populated in dry-run mode.
#[derive(Debug, Clone)]
pub struct TeardownRun {
    pub report: TeardownReport,
    pub planned: Vec<PlannedAction>,
}

/// Tear everything down. With `dry_run`, reads still hit the cluster but
/// every mutation is only logged and collected.
pub fn teardown(
    registry: &Registry,
    client: &dyn ClusterClient,
    clock: &dyn Clock,
    options: TeardownOptions,
    dry_run: bool,
    sink: &mut dyn ProgressSink,
) -> TeardownRun {
    if dry_run {
        let executor = LogOnlyExecutor::new();
        let report = TeardownOrchestrator::new(registry, client, &executor, clock, options).run(sink);
        TeardownRun {
            report,
            planned: executor.planned(),
        }
    } else {
        let executor = LiveExecutor::new(client);
        let report = TeardownOrchestrator::new(registry, client, &executor, clock, options).run(sink);
        TeardownRun {
            report,
            planned: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use convoy_cluster::fake::{objects, FakeCluster};
    use convoy_core::{RegistryDocument, Unit, UnitKind};

    use super::*;
    use crate::clock::ManualClock;
    use crate::events::NoProgress;
    use crate::teardown::DeleteOutcome;

    fn registry() -> Registry {
        Registry::from_document(RegistryDocument {
            units: vec![
                Unit::new("a", UnitKind::Operator),
                Unit::new("b", UnitKind::Instance).depends_on("a"),
            ],
            ..Default::default()
        })
        .expect("registry")
    }

    #[test]
    fn run_single_unit_reports_one_attempt() {
        let registry = registry();
        let profile = registry.profile().clone();
        let cluster = FakeCluster::new();
        cluster.insert(
            &profile.unit_kind,
            objects::application(&profile.namespace, "b", "Synced", "Healthy"),
        );
        let clock = ManualClock::new();

        let report = run(
            &registry,
            &cluster,
            &clock,
            SyncOptions::default(),
            &SyncScope::Unit("b".to_string()),
            &mut NoProgress,
        )
        .expect("run");
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.succeeded(), 1);
    }

    #[test]
    fn dry_run_teardown_collects_plan_without_mutating() {
        let registry = registry();
        let profile = registry.profile().clone();
        let cluster = FakeCluster::new();
        let a = cluster.insert(
            &profile.unit_kind,
            objects::application(&profile.namespace, "a", "Synced", "Healthy"),
        );
        let clock = ManualClock::new();

        let outcome = teardown(
            &registry,
            &cluster,
            &clock,
            TeardownOptions::default(),
            true,
            &mut NoProgress,
        );
        assert!(cluster.mutations().is_empty());
        assert!(cluster.exists(&a));
        assert!(!outcome.planned.is_empty());
        assert_eq!(outcome.report.count(DeleteOutcome::Planned), 1);
        assert_eq!(outcome.report.count(DeleteOutcome::AlreadyAbsent), 1);
    }
}
