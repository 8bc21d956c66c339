//! Execution state tracking for the workflow run.
//!
//! Per-phase outcomes and the final run summary. Every terminal Failed
//! phase and every error-severity risk appears here; nothing fails
//! silently.

use crate::discovery::BeadTree;
use crate::phase::PhaseStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Final record of one phase's run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: String,
    /// Status when the run ended. Non-terminal statuses mean the run was
    /// canceled or deadlocked before the phase could finish.
    pub status: PhaseStatus,
    pub cycles: u32,
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Review sub-issues observed cycle by cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beads: Option<BeadTree>,
}

impl PhaseOutcome {
    pub fn is_done(&self) -> bool {
        self.status == PhaseStatus::Done
    }
}

/// Summary of a completed (or canceled) workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub total_phases: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    pub canceled: bool,
    pub total_cost_usd: f64,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub outcomes: HashMap<String, PhaseOutcome>,
}

impl WorkflowSummary {
    pub fn new(total_phases: usize) -> Self {
        Self {
            total_phases,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: PhaseOutcome) {
        self.outcomes.insert(outcome.phase.clone(), outcome);
    }

    /// Refresh the per-outcome tallies from (done, failed, skipped).
    pub fn set_counts(&mut self, counts: (usize, usize, usize)) {
        self.done = counts.0;
        self.failed = counts.1;
        self.skipped = counts.2;
    }

    pub fn all_done(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.done == self.total_phases
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Serde helpers for Duration serialization (milliseconds).
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
