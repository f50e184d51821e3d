//! Error types for convoy-cluster.

use thiserror::Error;

/// All errors that can arise from calls against the cluster API.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Neither the configured nor any fallback CLI binary is on `$PATH`.
    #[error("cluster CLI not found (tried: {})", tried.join(", "))]
    BinaryNotFound { tried: Vec<String> },

    /// The CLI process could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The CLI exited non-zero.
    #[error("`{program} {args}` failed: {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        stderr: String,
    },

    /// The target object does not exist (patch / annotate paths).
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The API rejected the call (injected by the in-memory cluster in tests).
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}
