//! Unblocks convergence without manual intervention.
//!
//! Both operations are idempotent and safe to call on every poll.

use serde_json::json;

use convoy_cluster::{extract_field, field, ClusterClient, ClusterError, Executor};
use convoy_core::{EngineProfile, ResourceRef, UnitName};

use crate::status::OPERATION_PHASE_PATH;

pub const APPROVED_PATH: &str = ".spec.approved";
pub const SYNC_REVISION_PATH: &str = ".status.sync.revision";
pub const INITIATOR: &str = "convoy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The last reconciliation did not fail (or the unit is absent); nothing done.
    NotFailed,
    /// A fresh reconciliation was requested.
    Cleared,
}

pub struct Recovery<'a> {
    client: &'a dyn ClusterClient,
    executor: &'a dyn Executor,
    profile: &'a EngineProfile,
}

impl<'a> Recovery<'a> {
    pub fn new(
        client: &'a dyn ClusterClient,
        executor: &'a dyn Executor,
        profile: &'a EngineProfile,
    ) -> Self {
        Self {
            client,
            executor,
            profile,
        }
    }

    /// Request a fresh reconciliation if the unit's last one is in a Failed
    /// terminal state.
    pub fn clear_failed_reconciliation(&self, unit: &UnitName) -> Result<ClearOutcome, ClusterError> {
        let target = self.profile.unit_ref(unit);
        let Some(obj) = self.client.get_resource(&target)? else {
            return Ok(ClearOutcome::NotFailed);
        };
        let phase = extract_field(&obj, OPERATION_PHASE_PATH);
        if !matches!(phase.as_str(), "Failed" | "Error") {
            return Ok(ClearOutcome::NotFailed);
        }

        let mut sync = json!({ "syncStrategy": { "hook": {} } });
        let revision = extract_field(&obj, SYNC_REVISION_PATH);
        if !revision.is_empty() {
            sync["revision"] = json!(revision);
        }
        let patch = json!({
            "operation": {
                "initiatedBy": { "username": INITIATOR },
                "sync": sync,
            }
        });
        self.executor.patch(&target, &patch)?;
        tracing::info!(unit = %unit, phase = %phase, "cleared failed reconciliation");
        Ok(ClearOutcome::Cleared)
    }

    /// Approve every pending manual install gate in `namespace`.
    ///
    /// Returns how many gates were approved. Individual approval failures
    /// are logged and skipped.
    pub fn approve_pending_install_gates(&self, namespace: &str) -> Result<usize, ClusterError> {
        let gates =
            self.client
                .list_resources(&self.profile.install_gate_kind, Some(namespace), None)?;
        let mut approved = 0;
        for gate in gates.iter().filter(|g| extract_field(g, APPROVED_PATH) == "false") {
            let Some(name) = field::object_name(gate) else {
                continue;
            };
            let target = ResourceRef::new(&self.profile.install_gate_kind, name, Some(namespace));
            match self
                .executor
                .patch(&target, &json!({ "spec": { "approved": true } }))
            {
                Ok(()) => {
                    tracing::info!(gate = %name, namespace = %namespace, "approved install gate");
                    approved += 1;
                }
                Err(err) => {
                    tracing::debug!(gate = %name, error = %err, "install gate approval failed");
                }
            }
        }
        Ok(approved)
    }
}
