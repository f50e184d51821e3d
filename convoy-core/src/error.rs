//! Error types for convoy-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse registry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The embedded registry table failed to parse.
    #[error("builtin registry is malformed: {0}")]
    Builtin(#[source] serde_yaml::Error),

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.convoy/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The registry YAML file did not exist at the expected path.
    #[error("registry not found at {path}")]
    RegistryNotFound { path: PathBuf },

    /// Lookup of a unit name the registry does not describe.
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("unit '{0}' is declared more than once")]
    DuplicateUnit(String),

    #[error("unit '{unit}' depends on unknown unit '{predecessor}'")]
    UnknownPredecessor { unit: String, predecessor: String },

    /// The dependency graph is not a DAG.
    #[error("dependency cycle detected among units: {}", units.join(", "))]
    CyclicDependency { units: Vec<String> },
}
