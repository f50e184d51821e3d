//! # convoy-cluster
//!
//! The external cluster API as seen by the orchestrators: the
//! [`ClusterClient`] trait, a CLI-backed implementation, the [`Executor`]
//! seam that every mutation passes through, and field extraction.
//!
//! The `testkit` feature adds [`fake::FakeCluster`], an in-memory cluster
//! with scriptable state transitions.

pub mod client;
pub mod error;
pub mod executor;
pub mod field;
pub mod kubectl;

#[cfg(any(test, feature = "testkit"))]
pub mod fake;

pub use client::{Cascade, ClusterClient, DeleteOptions};
pub use error::ClusterError;
pub use executor::{Executor, LiveExecutor, LogOnlyExecutor, PlannedAction};
pub use field::extract_field;
pub use kubectl::KubectlClient;
