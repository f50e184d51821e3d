//! # convoy-sync
//!
//! Staged sync and teardown orchestration.
//!
//! [`SyncOrchestrator`] realizes every unit of a [`convoy_core::Registry`]
//! in dependency order, one at a time, tolerating per-unit timeouts.
//! [`TeardownOrchestrator`] removes everything in reverse order with
//! finalizer-aware fallbacks. Both read through a
//! [`convoy_cluster::ClusterClient`], mutate through a
//! [`convoy_cluster::Executor`], and wait on a [`Clock`].
//!
//! [`pipeline`] wires these together for the CLI.

pub mod clock;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod prober;
pub mod recovery;
pub mod status;
pub mod teardown;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SyncError;
pub use events::{Event, EventLog, NoProgress, ProgressSink, UnitPhase};
pub use orchestrator::{SyncOptions, SyncOrchestrator, SyncReport, SyncScope};
pub use status::{snapshot, unobserved, UnitStatus};
pub use teardown::{
    DeleteOutcome, TeardownEntry, TeardownOptions, TeardownOrchestrator, TeardownReport,
    TeardownStage,
};
