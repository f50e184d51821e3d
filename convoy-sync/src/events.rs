//! Progress events emitted by the orchestrators.
//!
//! The orchestrators never print; the CLI (or a test) consumes these
//! through a [`ProgressSink`].

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use serde::Serialize;

use convoy_core::{HealthState, Outcome, ReadinessSignal, ResourceRef, SyncState, UnitName};

use crate::teardown::{DeleteOutcome, TeardownStage};

/// Position of a unit in the per-unit sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitPhase {
    NotFound,
    AwaitingSignal,
    Converging,
    Healthy,
    TimedOut,
    Skipped,
}

impl From<Outcome> for UnitPhase {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Succeeded => UnitPhase::Healthy,
            Outcome::TimedOut => UnitPhase::TimedOut,
            Outcome::Skipped => UnitPhase::Skipped,
            Outcome::Pending => UnitPhase::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    BootstrapApplied {
        path: PathBuf,
    },
    PreflightPolled {
        present: usize,
        total: usize,
    },
    PreflightFinished {
        missing: Vec<UnitName>,
    },
    UnitStarted {
        unit: UnitName,
        position: usize,
        total: usize,
    },
    PhaseChanged {
        unit: UnitName,
        phase: UnitPhase,
    },
    SignalTimedOut {
        unit: UnitName,
        signal: ReadinessSignal,
    },
    ReconciliationCleared {
        unit: UnitName,
    },
    GatesApproved {
        unit: UnitName,
        namespace: String,
        count: usize,
    },
    HealthPolled {
        unit: UnitName,
        sync: SyncState,
        health: HealthState,
        elapsed_secs: u64,
    },
    UnitFinished {
        unit: UnitName,
        outcome: Outcome,
    },
    TeardownStep {
        stage: TeardownStage,
        resource: ResourceRef,
        outcome: DeleteOutcome,
    },
}

pub trait ProgressSink {
    fn emit(&mut self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: Event) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct EventLog(pub Vec<Event>);

impl EventLog {
    pub fn events(&self) -> &[Event] {
        &self.0
    }

    /// Index of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.0.iter().position(pred)
    }
}

impl ProgressSink for EventLog {
    fn emit(&mut self, event: Event) {
        self.0.push(event);
    }
}

impl ProgressSink for Sender<Event> {
    fn emit(&mut self, event: Event) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}
