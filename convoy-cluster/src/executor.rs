//! Every mutation issued by the orchestrators goes through an [`Executor`].
//!
//! [`LiveExecutor`] forwards to a [`ClusterClient`]; [`LogOnlyExecutor`]
//! records a [`PlannedAction`] and never touches the cluster.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use convoy_core::ResourceRef;

use crate::client::{ClusterClient, DeleteOptions};
use crate::error::ClusterError;

/// A mutation as seen by the log-only executor.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Patch { target: ResourceRef, patch: Value },
    Delete { target: ResourceRef, force: bool },
    Annotate { target: ResourceRef, key: String, value: String },
    Apply { path: PathBuf },
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedAction::Patch { target, patch } => write!(f, "patch {target} with {patch}"),
            PlannedAction::Delete { target, force: true } => write!(f, "force-delete {target}"),
            PlannedAction::Delete { target, force: false } => write!(f, "delete {target}"),
            PlannedAction::Annotate { target, key, value } => {
                write!(f, "annotate {target} {key}={value}")
            }
            PlannedAction::Apply { path } => write!(f, "apply {}", path.display()),
        }
    }
}

pub trait Executor {
    fn patch(&self, target: &ResourceRef, patch: &Value) -> Result<(), ClusterError>;
    fn delete(&self, target: &ResourceRef, opts: &DeleteOptions) -> Result<(), ClusterError>;
    fn annotate(&self, target: &ResourceRef, key: &str, value: &str) -> Result<(), ClusterError>;
    fn apply(&self, path: &Path) -> Result<(), ClusterError>;

    /// True when mutations are only recorded.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Forwards every mutation to the cluster.
pub struct LiveExecutor<'c> {
    client: &'c dyn ClusterClient,
}

impl<'c> LiveExecutor<'c> {
    pub fn new(client: &'c dyn ClusterClient) -> Self {
        Self { client }
    }
}

impl Executor for LiveExecutor<'_> {
    fn patch(&self, target: &ResourceRef, patch: &Value) -> Result<(), ClusterError> {
        self.client.patch_resource(target, patch)
    }

    fn delete(&self, target: &ResourceRef, opts: &DeleteOptions) -> Result<(), ClusterError> {
        self.client.delete_resource(target, opts)
    }

    fn annotate(&self, target: &ResourceRef, key: &str, value: &str) -> Result<(), ClusterError> {
        self.client.annotate(target, key, value)
    }

    fn apply(&self, path: &Path) -> Result<(), ClusterError> {
        self.client.apply_manifest(path)
    }
}

/// Records mutations instead of performing them.
#[derive(Debug, Default)]
pub struct LogOnlyExecutor {
    planned: Mutex<Vec<PlannedAction>>,
}

impl LogOnlyExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything that would have been done, in order.
    pub fn planned(&self) -> Vec<PlannedAction> {
        self.planned
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn record(&self, action: PlannedAction) {
        tracing::info!("[dry-run] would {action}");
        if let Ok(mut planned) = self.planned.lock() {
            planned.push(action);
        }
    }
}

impl Executor for LogOnlyExecutor {
    fn patch(&self, target: &ResourceRef, patch: &Value) -> Result<(), ClusterError> {
        self.record(PlannedAction::Patch {
            target: target.clone(),
            patch: patch.clone(),
        });
        Ok(())
    }

    fn delete(&self, target: &ResourceRef, opts: &DeleteOptions) -> Result<(), ClusterError> {
        self.record(PlannedAction::Delete {
            target: target.clone(),
            force: opts.is_force(),
        });
        Ok(())
    }

    fn annotate(&self, target: &ResourceRef, key: &str, value: &str) -> Result<(), ClusterError> {
        self.record(PlannedAction::Annotate {
            target: target.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn apply(&self, path: &Path) -> Result<(), ClusterError> {
        self.record(PlannedAction::Apply {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_only_records_in_order_and_reports_dry_run() {
        let exec = LogOnlyExecutor::new();
        let app = ResourceRef::new("applications.argoproj.io", "a", Some("gitops"));
        exec.annotate(&app, "refresh", "hard").unwrap();
        exec.delete(&app, &DeleteOptions::force()).unwrap();
        exec.patch(&app, &json!({"spec": {}})).unwrap();

        assert!(exec.is_dry_run());
        let planned = exec.planned();
        assert_eq!(planned.len(), 3);
        assert!(matches!(planned[1], PlannedAction::Delete { force: true, .. }));
        assert_eq!(
            planned[1].to_string(),
            "force-delete applications.argoproj.io/a (ns gitops)"
        );
    }
}
