//! Reverse-order, cascade-aware removal.
//!
//! ## Stages
//!
//! 1. Disable grouping resources so nothing is recreated mid-teardown.
//! 2. Units in cleanup order: ensure the cascade finalizer, delete
//!    (non-blocking), wait for disappearance; on timeout strip finalizers
//!    and force-delete.
//! 3. Drift: unit-kind objects in the engine namespace the registry does
//!    not describe.
//! 4. Grouping resources themselves.
//! 5. Conflicting installations.
//! 6. Namespace sweep: strip finalizers of known kinds, delete, wait.
//!
//! Every step tolerates "already absent". With a dry-run executor no wait
//! is performed and every deletion is reported as planned.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use convoy_cluster::{field, ClusterClient, DeleteOptions, Executor};
use convoy_core::{GroupingResource, Registry, ResourceRef};

use crate::clock::Clock;
use crate::events::{Event, ProgressSink};

pub const NAMESPACE_KIND: &str = "namespaces";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownOptions {
    pub poll_interval: Duration,
    /// Budget for a unit (or drift / grouping / conflicting object) to disappear.
    pub delete_timeout: Duration,
    /// Budget after finalizers were stripped and a force delete was issued.
    pub force_timeout: Duration,
    pub namespace_timeout: Duration,
}

impl Default for TeardownOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            delete_timeout: Duration::from_secs(300),
            force_timeout: Duration::from_secs(60),
            namespace_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStage {
    Grouping,
    Unit,
    Drift,
    Conflicting,
    Namespace,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownStage::Grouping => write!(f, "grouping"),
            TeardownStage::Unit => write!(f, "unit"),
            TeardownStage::Drift => write!(f, "drift"),
            TeardownStage::Conflicting => write!(f, "conflicting"),
            TeardownStage::Namespace => write!(f, "namespace"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    AlreadyAbsent,
    /// Grouping resource switched off (it is deleted in a later stage).
    Disabled,
    Deleted,
    ForceDeleted,
    /// Still present after the force fallback.
    Stuck,
    /// Dry-run: the deletion would have been issued.
    Planned,
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::AlreadyAbsent => write!(f, "already absent"),
            DeleteOutcome::Disabled => write!(f, "disabled"),
            DeleteOutcome::Deleted => write!(f, "deleted"),
            DeleteOutcome::ForceDeleted => write!(f, "force-deleted"),
            DeleteOutcome::Stuck => write!(f, "stuck"),
            DeleteOutcome::Planned => write!(f, "planned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownEntry {
    pub stage: TeardownStage,
    pub resource: ResourceRef,
    pub outcome: DeleteOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub entries: Vec<TeardownEntry>,
}

impl TeardownReport {
    pub fn count(&self, outcome: DeleteOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn stuck(&self) -> Vec<&TeardownEntry> {
        self.entries
            .iter()
            .filter(|e| e.outcome == DeleteOutcome::Stuck)
            .collect()
    }
}

fn record(
    report: &mut TeardownReport,
    sink: &mut dyn ProgressSink,
    stage: TeardownStage,
    resource: ResourceRef,
    outcome: DeleteOutcome,
) {
    tracing::info!(stage = %stage, resource = %resource, outcome = %outcome, "teardown step");
    sink.emit(Event::TeardownStep {
        stage,
        resource: resource.clone(),
        outcome,
    });
    report.entries.push(TeardownEntry {
        stage,
        resource,
        outcome,
    });
}

pub struct TeardownOrchestrator<'a> {
    registry: &'a Registry,
    client: &'a dyn ClusterClient,
    executor: &'a dyn Executor,
    clock: &'a dyn Clock,
    options: TeardownOptions,
}

impl<'a> TeardownOrchestrator<'a> {
    pub fn new(
        registry: &'a Registry,
        client: &'a dyn ClusterClient,
        executor: &'a dyn Executor,
        clock: &'a dyn Clock,
        options: TeardownOptions,
    ) -> Self {
        Self {
            registry,
            client,
            executor,
            clock,
            options,
        }
    }

    pub fn run(&self, sink: &mut dyn ProgressSink) -> TeardownReport {
        let profile = self.registry.profile();
        let mut report = TeardownReport::default();
        // 1. grouping disable
        for grouping in &profile.grouping {
            if let Some(outcome) = self.disable_grouping(grouping) {
                record(
                    &mut report,
                    sink,
                    TeardownStage::Grouping,
                    grouping.resource.clone(),
                    outcome,
                );
            }
        }

        // 2. units, reverse dependency order
        for unit in self.registry.cleanup_order() {
            let target = profile.unit_ref(&unit.name);
            let outcome = self.remove(&target, true, self.options.delete_timeout);
            record(&mut report, sink, TeardownStage::Unit, target, outcome);
        }

        // 3. drift
        for target in self.drift() {
            let outcome = self.remove(&target, true, self.options.delete_timeout);
            record(&mut report, sink, TeardownStage::Drift, target, outcome);
        }

        // 4. grouping resources
        for grouping in &profile.grouping {
            let outcome = self.remove(&grouping.resource, false, self.options.delete_timeout);
            record(
                &mut report,
                sink,
                TeardownStage::Grouping,
                grouping.resource.clone(),
                outcome,
            );
        }

        // 5. conflicting installations
        for target in self.registry.conflicting_installations() {
            let outcome = self.remove(target, false, self.options.delete_timeout);
            record(
                &mut report,
                sink,
                TeardownStage::Conflicting,
                target.clone(),
                outcome,
            );
        }

        // 6. namespace sweep
        for ns in self.registry.managed_namespaces() {
            let target = ResourceRef::new(NAMESPACE_KIND, ns, None);
            let outcome = self.sweep_namespace(&target);
            record(&mut report, sink, TeardownStage::Namespace, target, outcome);
        }

        report
    }

    fn disable_grouping(&self, grouping: &GroupingResource) -> Option<DeleteOutcome> {
        self.read(&grouping.resource)?;
        let patch = grouping
            .disable_patch
            .as_ref()
            .and_then(|p| serde_json::to_value(p).ok())
            .unwrap_or_else(|| json!({ "spec": { "syncPolicy": { "automated": null } } }));
        match self.executor.patch(&grouping.resource, &patch) {
            Ok(()) => Some(DeleteOutcome::Disabled),
            Err(err) => {
                tracing::warn!(resource = %grouping.resource, error = %err, "disabling grouping resource failed");
                None
            }
        }
    }

    /// Unit-kind objects in the engine namespace that the registry does not describe.
    fn drift(&self) -> Vec<ResourceRef> {
        let profile = self.registry.profile();
        let grouping: HashSet<&str> = profile
            .grouping
            .iter()
            .filter(|g| g.resource.kind == profile.unit_kind)
            .map(|g| g.resource.name.as_str())
            .collect();
        let listed = match self
            .client
            .list_resources(&profile.unit_kind, Some(&profile.namespace), None)
        {
            Ok(objects) => objects,
            Err(err) => {
                tracing::warn!(error = %err, "listing units for drift failed; skipping drift cleanup");
                return vec![];
            }
        };
        listed
            .iter()
            .filter_map(field::object_name)
            .filter(|name| !self.registry.contains(name) && !grouping.contains(name))
            .map(|name| ResourceRef::new(&profile.unit_kind, name, Some(&profile.namespace)))
            .collect()
    }

    /// Delete `target` and wait for it to disappear, falling back to
    /// finalizer removal and a force delete.
    fn remove(&self, target: &ResourceRef, cascade: bool, timeout: Duration) -> DeleteOutcome {
        let Some(obj) = self.read(target) else {
            return DeleteOutcome::AlreadyAbsent;
        };

        if cascade {
            let marker = &self.registry.profile().cascade_finalizer;
            let mut finalizers = field::finalizers(&obj);
            if !finalizers.iter().any(|f| f == marker) {
                finalizers.push(marker.clone());
                let patch = json!({ "metadata": { "finalizers": finalizers } });
                if let Err(err) = self.executor.patch(target, &patch) {
                    tracing::warn!(resource = %target, error = %err, "adding cascade finalizer failed");
                }
            }
        }

        let opts = if cascade {
            DeleteOptions::cascading()
        } else {
            DeleteOptions::default()
        };
        if let Err(err) = self.executor.delete(target, &opts) {
            tracing::warn!(resource = %target, error = %err, "delete request failed");
        }
        if self.executor.is_dry_run() {
            return DeleteOutcome::Planned;
        }
        if self.wait_gone(target, timeout) {
            return DeleteOutcome::Deleted;
        }

        tracing::warn!(resource = %target, timeout_secs = timeout.as_secs(), "deletion timed out; forcing");
        self.strip_finalizers(target);
        if let Err(err) = self.executor.delete(target, &DeleteOptions::force()) {
            tracing::warn!(resource = %target, error = %err, "force delete failed");
        }
        if self.wait_gone(target, self.options.force_timeout) {
            DeleteOutcome::ForceDeleted
        } else {
            tracing::warn!(resource = %target, "resource still present after force delete");
            DeleteOutcome::Stuck
        }
    }

    fn sweep_namespace(&self, target: &ResourceRef) -> DeleteOutcome {
        if self.read(target).is_none() {
            return DeleteOutcome::AlreadyAbsent;
        }
        for kind in self.sweep_kinds() {
            let objects = match self.client.list_resources(kind, Some(&target.name), None) {
                Ok(objects) => objects,
                Err(err) => {
                    tracing::debug!(kind = %kind, namespace = %target.name, error = %err, "finalizer sweep list failed");
                    continue;
                }
            };
            for obj in objects.iter().filter(|o| !field::finalizers(o).is_empty()) {
                if let Some(name) = field::object_name(obj) {
                    self.strip_finalizers(&ResourceRef::new(kind, name, Some(&target.name)));
                }
            }
        }

        if let Err(err) = self.executor.delete(target, &DeleteOptions::default()) {
            tracing::warn!(namespace = %target.name, error = %err, "namespace delete failed");
        }
        if self.executor.is_dry_run() {
            return DeleteOutcome::Planned;
        }
        if self.wait_gone(target, self.options.namespace_timeout) {
            DeleteOutcome::Deleted
        } else {
            tracing::warn!(namespace = %target.name, "namespace still terminating");
            DeleteOutcome::Stuck
        }
    }

    /// Kinds swept inside a managed namespace. Without a configured table
    /// the unit kind is swept.
    fn sweep_kinds(&self) -> Vec<&str> {
        let configured = self.registry.finalizer_sweep_kinds();
        if configured.is_empty() {
            return vec![self.registry.profile().unit_kind.as_str()];
        }
        configured.iter().map(String::as_str).collect()
    }

    fn strip_finalizers(&self, target: &ResourceRef) {
        let patch = json!({ "metadata": { "finalizers": Value::Null } });
        if let Err(err) = self.executor.patch(target, &patch) {
            if !err.is_not_found() {
                tracing::debug!(resource = %target, error = %err, "stripping finalizers failed");
            }
        }
    }

    fn wait_gone(&self, target: &ResourceRef, timeout: Duration) -> bool {
        let started = self.clock.now();
        loop {
            match self.client.get_resource(target) {
                Ok(None) => return true,
                Ok(Some(_)) => {}
                Err(err) => tracing::debug!(resource = %target, error = %err, "disappearance poll failed"),
            }
            if self.clock.elapsed_since(started) >= timeout {
                return false;
            }
            self.clock.sleep(self.options.poll_interval);
        }
    }

    fn read(&self, target: &ResourceRef) -> Option<Value> {
        match self.client.get_resource(target) {
            Ok(obj) => obj,
            Err(err) => {
                tracing::debug!(resource = %target, error = %err, "teardown read failed");
                None
            }
        }
    }
}
