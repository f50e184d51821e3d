//! Readiness gating.
//!
//! Later units reference resource kinds or instances that only exist once
//! an earlier unit's controller has installed them. The prober polls the
//! declared [`ReadinessSignal`] until it holds or the timeout elapses. A
//! timeout is a soft outcome: the caller logs it and carries on.

use std::time::Duration;

use convoy_cluster::{extract_field, field, ClusterClient};
use convoy_core::{EngineProfile, ReadinessSignal, ResourceRef};

use crate::clock::Clock;

pub const PHASE_PATH: &str = ".status.phase";
pub const CONTROLLER_READY_PHASE: &str = "Succeeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

pub struct Prober<'a> {
    client: &'a dyn ClusterClient,
    clock: &'a dyn Clock,
    profile: &'a EngineProfile,
    poll_interval: Duration,
}

impl<'a> Prober<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        clock: &'a dyn Clock,
        profile: &'a EngineProfile,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            clock,
            profile,
            poll_interval,
        }
    }

    /// Block until `signal` holds or `timeout` elapses. Checked at least once.
    pub fn await_ready(&self, signal: &ReadinessSignal, timeout: Duration) -> Readiness {
        let started = self.clock.now();
        loop {
            if self.is_satisfied(signal) {
                tracing::debug!(signal = %signal, "readiness signal satisfied");
                return Readiness::Ready;
            }
            if self.clock.elapsed_since(started) >= timeout {
                return Readiness::TimedOut;
            }
            self.clock.sleep(self.poll_interval);
        }
    }

    /// One evaluation of the signal's predicate. Read errors count as unsatisfied.
    pub fn is_satisfied(&self, signal: &ReadinessSignal) -> bool {
        match signal {
            ReadinessSignal::Crd { name } => {
                let target = ResourceRef::new(&self.profile.crd_kind, name, None);
                self.read(&target).is_some()
            }
            ReadinessSignal::Controller {
                name_prefix,
                namespace,
            } => match self
                .client
                .list_resources(&self.profile.controller_kind, Some(namespace), None)
            {
                Ok(controllers) => controllers.iter().any(|c| {
                    field::object_name(c).is_some_and(|n| n.starts_with(name_prefix.as_str()))
                        && extract_field(c, PHASE_PATH) == CONTROLLER_READY_PHASE
                }),
                Err(err) => {
                    tracing::debug!(namespace = %namespace, error = %err, "controller list failed");
                    false
                }
            },
            ReadinessSignal::ResourcePhase {
                resource,
                expected_phase,
            } => self
                .read(resource)
                .is_some_and(|obj| extract_field(&obj, PHASE_PATH) == *expected_phase),
        }
    }

    fn read(&self, target: &ResourceRef) -> Option<serde_json::Value> {
        match self.client.get_resource(target) {
            Ok(obj) => obj,
            Err(err) => {
                tracing::debug!(resource = %target, error = %err, "readiness read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use convoy_cluster::fake::{objects, FakeCluster};
    use serde_json::json;

    const POLL: Duration = Duration::from_secs(5);

    #[test]
    fn crd_signal_waits_for_registration() {
        let profile = EngineProfile::default();
        let cluster = FakeCluster::new();
        let clock = ManualClock::new();
        cluster.insert_after_reads(3, &profile.crd_kind, objects::named("widgets.example.io", None));

        let prober = Prober::new(&cluster, &clock, &profile, POLL);
        let signal = ReadinessSignal::Crd {
            name: "widgets.example.io".to_string(),
        };
        assert_eq!(prober.await_ready(&signal, Duration::from_secs(300)), Readiness::Ready);
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn controller_signal_requires_prefix_and_succeeded_phase() {
        let profile = EngineProfile::default();
        let cluster = FakeCluster::new();
        let clock = ManualClock::new();
        cluster.insert(
            &profile.controller_kind,
            objects::controller("redhat-ods-operator", "rhods-operator.2.16.0", "Installing"),
        );
        cluster.insert(
            &profile.controller_kind,
            objects::controller("redhat-ods-operator", "other-operator.1.0.0", "Succeeded"),
        );
        let prober = Prober::new(&cluster, &clock, &profile, POLL);
        let signal = ReadinessSignal::Controller {
            name_prefix: "rhods-operator".to_string(),
            namespace: "redhat-ods-operator".to_string(),
        };
        assert!(!prober.is_satisfied(&signal));

        cluster
            .patch_resource(
                &ResourceRef::new(&profile.controller_kind, "rhods-operator.2.16.0", Some("redhat-ods-operator")),
                &json!({ "status": { "phase": "Succeeded" } }),
            )
            .unwrap();
        assert!(prober.is_satisfied(&signal));
    }

    #[test]
    fn resource_phase_times_out_softly() {
        let profile = EngineProfile::default();
        let cluster = FakeCluster::new();
        let clock = ManualClock::new();
        cluster.insert(
            "dscinitializations",
            json!({ "metadata": { "name": "default-dsci" }, "status": { "phase": "Progressing" } }),
        );
        let prober = Prober::new(&cluster, &clock, &profile, POLL);
        let signal = ReadinessSignal::ResourcePhase {
            resource: ResourceRef::new("dscinitializations", "default-dsci", None),
            expected_phase: "Ready".to_string(),
        };
        assert_eq!(prober.await_ready(&signal, Duration::from_secs(20)), Readiness::TimedOut);
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
    }

    #[test]
    fn read_errors_count_as_unsatisfied() {
        let profile = EngineProfile::default();
        let cluster = FakeCluster::new();
        cluster.fail_kind(&profile.crd_kind);
        let clock = ManualClock::new();
        let prober = Prober::new(&cluster, &clock, &profile, POLL);
        assert!(!prober.is_satisfied(&ReadinessSignal::Crd {
            name: "x".to_string()
        }));
    }
}
