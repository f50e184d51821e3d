//! The cluster API surface consumed by the orchestrators.

use std::fmt;
use std::path::Path;

use serde_json::Value;

use convoy_core::ResourceRef;

use crate::error::ClusterError;

/// Propagation policy for dependents of a deleted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cascade {
    #[default]
    Background,
    Foreground,
    Orphan,
}

impl fmt::Display for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cascade::Background => write!(f, "background"),
            Cascade::Foreground => write!(f, "foreground"),
            Cascade::Orphan => write!(f, "orphan"),
        }
    }
}

/// Options for [`ClusterClient::delete_resource`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    pub cascade: Cascade,
    /// `Some(0)` forces immediate removal.
    pub grace_period: Option<u32>,
}

impl DeleteOptions {
    /// Non-blocking foreground delete: dependents go first.
    pub fn cascading() -> Self {
        Self {
            cascade: Cascade::Foreground,
            grace_period: None,
        }
    }

    pub fn force() -> Self {
        Self {
            cascade: Cascade::Background,
            grace_period: Some(0),
        }
    }

    pub fn is_force(&self) -> bool {
        self.grace_period == Some(0)
    }
}

/// Get / list / patch / delete / apply against a remote declarative-state API.
///
/// Implementations never block on deletion; callers poll for disappearance.
pub trait ClusterClient {
    /// Returns `Ok(None)` when the object does not exist.
    fn get_resource(&self, target: &ResourceRef) -> Result<Option<Value>, ClusterError>;

    /// `namespace: None` lists across all namespaces.
    fn list_resources(
        &self,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, ClusterError>;

    /// JSON merge patch.
    fn patch_resource(&self, target: &ResourceRef, patch: &Value) -> Result<(), ClusterError>;

    /// Deleting an absent object succeeds.
    fn delete_resource(&self, target: &ResourceRef, opts: &DeleteOptions)
        -> Result<(), ClusterError>;

    /// Apply a manifest file or a kustomization directory.
    fn apply_manifest(&self, path: &Path) -> Result<(), ClusterError>;

    fn annotate(&self, target: &ResourceRef, key: &str, value: &str) -> Result<(), ClusterError>;
}
