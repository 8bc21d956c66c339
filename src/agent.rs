//! Agent execution boundary.
//!
//! The core never invokes an LLM or captures diffs itself; it calls out
//! through [`CycleAgent`] to run one coder/reviewer cycle for a phase and
//! to capture the resulting diff. Both operations are opaque beyond their
//! return contract.

use crate::phase::{Phase, RiskSeverity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reviewer verdict for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleVerdict {
    /// Zero issues found; the phase is done.
    Approved,
    /// Issues found that the coder step can address next cycle.
    Revise,
    /// The reviewer cannot resolve this automatically (ambiguous
    /// requirement, disputed contract); the phase must gate.
    Escalate,
}

/// A single issue found by the reviewer step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleIssue {
    pub summary: String,
    pub severity: RiskSeverity,
}

impl CycleIssue {
    pub fn new(summary: &str, severity: RiskSeverity) -> Self {
        Self {
            summary: summary.to_string(),
            severity,
        }
    }
}

/// Outcome of one coder/reviewer cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub issues: Vec<CycleIssue>,
    /// Spend attributed to this cycle.
    pub cost_usd: f64,
    pub verdict: CycleVerdict,
}

impl CycleOutcome {
    pub fn approved(cost_usd: f64) -> Self {
        Self {
            issues: Vec::new(),
            cost_usd,
            verdict: CycleVerdict::Approved,
        }
    }

    pub fn revise(issues: Vec<CycleIssue>, cost_usd: f64) -> Self {
        Self {
            issues,
            cost_usd,
            verdict: CycleVerdict::Revise,
        }
    }

    pub fn escalate(issues: Vec<CycleIssue>, cost_usd: f64) -> Self {
        Self {
            issues,
            cost_usd,
            verdict: CycleVerdict::Escalate,
        }
    }
}

/// Summary of the diff captured after a coding step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub files_added: Vec<String>,
    pub files_modified: Vec<String>,
    pub files_deleted: Vec<String>,
}

impl DiffSummary {
    pub fn total_files(&self) -> usize {
        self.files_added.len() + self.files_modified.len() + self.files_deleted.len()
    }
}

/// External executor of coder/reviewer cycles.
#[async_trait]
pub trait CycleAgent: Send + Sync {
    /// Run one coder/reviewer cycle for the phase.
    async fn run_cycle(&self, phase: &Phase, cycle: u32) -> anyhow::Result<CycleOutcome>;

    /// Capture the diff produced by the last coding step. Default: no
    /// capture available.
    async fn capture_diff(&self, _phase: &Phase) -> anyhow::Result<DiffSummary> {
        Ok(DiffSummary::default())
    }
}
