//! Convoy core library: unit types, registry document, dependency order.
//!
//! Public API surface:
//! - [`types`]: newtypes, registry document, run-time observation types
//! - [`error`]: [`RegistryError`]
//! - [`registry`]: load / validate / order

pub mod error;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use registry::Registry;
pub use types::{
    CleanupTables, EngineProfile, GroupingResource, HealthState, Outcome, ReadinessSignal,
    RegistryDocument, ResourceRef, RetryPolicy, SyncAttempt, SyncState, Unit, UnitKind, UnitName,
};
