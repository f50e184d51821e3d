//! Staged sync: realize every unit in dependency order.
//!
//! ## Per-unit protocol
//!
//! 1. Wait (bounded) for the unit's remote representation; absent → Skipped.
//! 2. Clear a Failed last reconciliation.
//! 3. Await the readiness signal (soft timeout).
//! 4. Enable automated convergence with bounded retry and request a refresh.
//! 5. Poll sync + health, approving install gates on every pass, until
//!    Synced + Healthy or the health timeout elapses (TimedOut, soft).
//!
//! Units are strictly serialized: unit N+1 starts only after unit N's
//! health loop has exited. Only the pre-flight check is fatal.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use convoy_cluster::{ClusterClient, ClusterError, Executor};
use convoy_core::{Outcome, Registry, ResourceRef, RetryPolicy, SyncAttempt, Unit, UnitName};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::events::{Event, ProgressSink, UnitPhase};
use crate::prober::{Prober, Readiness};
use crate::recovery::{ClearOutcome, Recovery};
use crate::status::observe;

/// Timeouts and policy for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    /// Budget for the whole unit set to materialize before anything is triggered.
    pub preflight_timeout: Duration,
    /// Per-unit budget for its remote representation to appear.
    pub existence_timeout: Duration,
    pub readiness_timeout: Duration,
    /// Default per-unit health budget; a unit's `health_timeout_seconds` overrides it.
    pub health_timeout: Duration,
    /// Abort on the first unit that does not converge, and require every
    /// unit to exist at pre-flight.
    pub fail_fast: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            preflight_timeout: Duration::from_secs(300),
            existence_timeout: Duration::from_secs(60),
            readiness_timeout: Duration::from_secs(300),
            health_timeout: Duration::from_secs(300),
            fail_fast: false,
        }
    }
}

/// Which units a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every unit, in sync order, after applying bootstrap manifests.
    All,
    /// A single named unit.
    Unit(String),
}

/// Summary of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempts: Vec<SyncAttempt>,
}

impl SyncReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.attempts.iter().filter(|a| a.outcome == outcome).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(Outcome::Succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    pub fn timed_out(&self) -> usize {
        self.count(Outcome::TimedOut)
    }

    pub fn attempt(&self, unit: &str) -> Option<&SyncAttempt> {
        self.attempts.iter().find(|a| a.unit.as_str() == unit)
    }
}

pub struct SyncOrchestrator<'a> {
    registry: &'a Registry,
    client: &'a dyn ClusterClient,
    executor: &'a dyn Executor,
    clock: &'a dyn Clock,
    options: SyncOptions,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        registry: &'a Registry,
        client: &'a dyn ClusterClient,
        executor: &'a dyn Executor,
        clock: &'a dyn Clock,
        options: SyncOptions,
    ) -> Self {
        Self {
            registry,
            client,
            executor,
            clock,
            options,
        }
    }

    pub fn run(
        &self,
        scope: &SyncScope,
        sink: &mut dyn ProgressSink,
    ) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let units: Vec<&Unit> = match scope {
            SyncScope::All => self.registry.sync_order().iter().collect(),
            SyncScope::Unit(name) => vec![self.registry.unit(name)?],
        };

        if *scope == SyncScope::All {
            for path in self.registry.bootstrap() {
                self.executor.apply(path)?;
                tracing::info!(path = %path.display(), "applied bootstrap manifest");
                sink.emit(Event::BootstrapApplied { path: path.clone() });
            }
        }

        self.preflight(&units, sink)?;

        let total = units.len();
        let mut attempts = Vec::with_capacity(total);
        for (i, unit) in units.into_iter().enumerate() {
            sink.emit(Event::UnitStarted {
                unit: unit.name.clone(),
                position: i + 1,
                total,
            });
            let attempt = self.sync_unit(unit, sink);
            let outcome = attempt.outcome;
            attempts.push(attempt);
            if self.options.fail_fast && outcome != Outcome::Succeeded {
                return Err(SyncError::UnitFailed {
                    unit: unit.name.0.clone(),
                    outcome,
                });
            }
        }

        Ok(SyncReport {
            started_at,
            finished_at: Utc::now(),
            attempts,
        })
    }

    /// Wait for the unit set to materialize. Fatal when nothing appears (or,
    /// in fail-fast mode, when anything is still missing at the deadline).
    fn preflight(&self, units: &[&Unit], sink: &mut dyn ProgressSink) -> Result<(), SyncError> {
        let profile = self.registry.profile();
        let started = self.clock.now();
        loop {
            let missing: Vec<UnitName> = units
                .iter()
                .filter(|u| !self.exists(&profile.unit_ref(&u.name)))
                .map(|u| u.name.clone())
                .collect();
            sink.emit(Event::PreflightPolled {
                present: units.len() - missing.len(),
                total: units.len(),
            });

            if missing.is_empty() {
                sink.emit(Event::PreflightFinished { missing });
                return Ok(());
            }

            let waited = self.clock.elapsed_since(started);
            if waited >= self.options.preflight_timeout {
                let nothing_to_do = missing.len() == units.len();
                if nothing_to_do || self.options.fail_fast {
                    return Err(SyncError::PreflightTimeout {
                        missing: missing.iter().map(|m| m.0.clone()).collect(),
                        waited_secs: waited.as_secs(),
                    });
                }
                tracing::warn!(
                    missing = %join_names(&missing),
                    "pre-flight deadline passed with units still missing; they will be skipped if they never appear"
                );
                sink.emit(Event::PreflightFinished { missing });
                return Ok(());
            }
            self.clock.sleep(self.options.poll_interval);
        }
    }

    fn sync_unit(&self, unit: &Unit, sink: &mut dyn ProgressSink) -> SyncAttempt {
        let profile = self.registry.profile();
        let target = profile.unit_ref(&unit.name);
        let mut attempt = SyncAttempt::start(unit.name.clone());
        let enter = |sink: &mut dyn ProgressSink, phase: UnitPhase| {
            sink.emit(Event::PhaseChanged {
                unit: unit.name.clone(),
                phase,
            })
        };
        enter(sink, UnitPhase::NotFound);

        // 1. existence
        if !self.wait_for_existence(&target) {
            tracing::warn!(unit = %unit.name, "unit never appeared; skipping");
            attempt.outcome = Outcome::Skipped;
            return self.finish(attempt, sink);
        }

        // 2. failed reconciliation
        let recovery = Recovery::new(self.client, self.executor, profile);
        match recovery.clear_failed_reconciliation(&unit.name) {
            Ok(ClearOutcome::Cleared) => sink.emit(Event::ReconciliationCleared {
                unit: unit.name.clone(),
            }),
            Ok(ClearOutcome::NotFailed) => {}
            Err(err) => {
                tracing::debug!(unit = %unit.name, error = %err, "clearing failed reconciliation")
            }
        }

        // 3. readiness
        if let Some(signal) = &unit.readiness {
            enter(sink, UnitPhase::AwaitingSignal);
            let prober = Prober::new(self.client, self.clock, profile, self.options.poll_interval);
            if prober.await_ready(signal, self.options.readiness_timeout) == Readiness::TimedOut {
                tracing::warn!(unit = %unit.name, signal = %signal, "readiness signal timed out; continuing");
                sink.emit(Event::SignalTimedOut {
                    unit: unit.name.clone(),
                    signal: signal.clone(),
                });
            }
        }

        // 4. convergence trigger
        enter(sink, UnitPhase::Converging);
        if let Err(err) = self.enable_convergence(&target, &profile.retry) {
            tracing::warn!(unit = %unit.name, error = %err, "enabling automated sync failed");
        }
        if let Err(err) = self.executor.annotate(
            &target,
            &profile.refresh_annotation,
            &profile.refresh_value,
        ) {
            tracing::warn!(unit = %unit.name, error = %err, "refresh request failed");
        }

        // 5. health loop
        let timeout = unit
            .health_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.options.health_timeout);
        let started = self.clock.now();
        loop {
            let obs = observe(self.client, profile, &unit.name);
            attempt.last_sync = obs.sync;
            attempt.last_health = obs.health;

            let gate_ns = unit
                .gate_namespace
                .clone()
                .or(obs.destination_namespace.clone());
            if let Some(ns) = gate_ns {
                match recovery.approve_pending_install_gates(&ns) {
                    Ok(0) => {}
                    Ok(count) => sink.emit(Event::GatesApproved {
                        unit: unit.name.clone(),
                        namespace: ns,
                        count,
                    }),
                    Err(err) => {
                        tracing::debug!(namespace = %ns, error = %err, "listing install gates failed")
                    }
                }
            }

            let elapsed = self.clock.elapsed_since(started);
            sink.emit(Event::HealthPolled {
                unit: unit.name.clone(),
                sync: obs.sync,
                health: obs.health,
                elapsed_secs: elapsed.as_secs(),
            });

            if attempt.is_converged() {
                attempt.outcome = Outcome::Succeeded;
                break;
            }
            if elapsed >= timeout {
                tracing::warn!(
                    unit = %unit.name,
                    sync = %obs.sync,
                    health = %obs.health,
                    timeout_secs = timeout.as_secs(),
                    "unit did not become Synced+Healthy in time; continuing"
                );
                attempt.outcome = Outcome::TimedOut;
                break;
            }
            self.clock.sleep(self.options.poll_interval);
        }

        self.finish(attempt, sink)
    }

    fn finish(&self, attempt: SyncAttempt, sink: &mut dyn ProgressSink) -> SyncAttempt {
        sink.emit(Event::PhaseChanged {
            unit: attempt.unit.clone(),
            phase: attempt.outcome.into(),
        });
        sink.emit(Event::UnitFinished {
            unit: attempt.unit.clone(),
            outcome: attempt.outcome,
        });
        tracing::info!(unit = %attempt.unit, outcome = %attempt.outcome, "unit processed");
        attempt
    }

    fn wait_for_existence(&self, target: &ResourceRef) -> bool {
        let started = self.clock.now();
        loop {
            if self.exists(target) {
                return true;
            }
            if self.clock.elapsed_since(started) >= self.options.existence_timeout {
                return false;
            }
            self.clock.sleep(self.options.poll_interval);
        }
    }

    fn exists(&self, target: &ResourceRef) -> bool {
        match self.client.get_resource(target) {
            Ok(found) => found.is_some(),
            Err(err) => {
                tracing::debug!(resource = %target, error = %err, "existence check failed");
                false
            }
        }
    }

    fn enable_convergence(
        &self,
        target: &ResourceRef,
        retry: &RetryPolicy,
    ) -> Result<(), ClusterError> {
        self.executor.patch(target, &automated_sync_patch(retry))
    }
}

/// Merge patch enabling automated sync with bounded exponential backoff.
pub fn automated_sync_patch(retry: &RetryPolicy) -> Value {
    json!({
        "spec": {
            "syncPolicy": {
                "automated": { "prune": true, "selfHeal": true },
                "retry": {
                    "limit": retry.limit,
                    "backoff": {
                        "duration": format!("{}s", retry.backoff_seconds),
                        "factor": retry.factor,
                        "maxDuration": format!("{}s", retry.max_backoff_seconds),
                    }
                }
            }
        }
    })
}

fn join_names(names: &[UnitName]) -> String {
    names
        .iter()
        .map(UnitName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_cluster::extract_field;

    #[test]
    fn automated_patch_carries_retry_policy() {
        let patch = automated_sync_patch(&RetryPolicy::default());
        assert_eq!(extract_field(&patch, ".spec.syncPolicy.retry.limit"), "5");
        assert_eq!(
            extract_field(&patch, ".spec.syncPolicy.retry.backoff.maxDuration"),
            "180s"
        );
        assert_eq!(extract_field(&patch, ".spec.syncPolicy.automated.selfHeal"), "true");
    }

    #[test]
    fn report_counts_by_outcome() {
        let mut a = SyncAttempt::start(UnitName::from("a"));
        a.outcome = Outcome::Succeeded;
        let mut b = SyncAttempt::start(UnitName::from("b"));
        b.outcome = Outcome::Skipped;
        let report = SyncReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            attempts: vec![a, b],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.timed_out(), 0);
        assert!(report.attempt("b").is_some());
    }
}
