//! Error types for convoy-sync.

use thiserror::Error;

use convoy_cluster::ClusterError;
use convoy_core::{Outcome, RegistryError};

/// Structural failures that abort a run. Per-unit timeouts and skips are
/// reported in the run summary instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the registry (e.g. unknown unit).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A call against the cluster failed where correctness depends on it.
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Units never materialized before the pre-flight deadline.
    #[error("pre-flight timed out after {waited_secs}s; missing units: {}", missing.join(", "))]
    PreflightTimeout {
        missing: Vec<String>,
        waited_secs: u64,
    },

    /// Fail-fast mode: a unit did not converge.
    #[error("unit '{unit}' {outcome}; stopping (fail-fast)")]
    UnitFailed { unit: String, outcome: Outcome },
}
