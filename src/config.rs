//! Workflow configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum phases simultaneously Working (concurrency tracks).
    pub tracks: usize,
    /// Default max cycles for phases whose spec does not set one.
    pub default_max_cycles: u32,
    /// Per-phase budget ceiling in USD.
    pub phase_budget_usd: f64,
    /// Skip dependents of a failed phase instead of letting them wait
    /// forever. Off by default: per-phase failures never cascade unless
    /// asked.
    pub fail_fast: bool,
    /// Open a workflow-acceptance checkpoint before releasing wave 1.
    pub require_acceptance: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tracks: 4,
            default_max_cycles: 5,
            phase_budget_usd: 25.0,
            fail_fast: false,
            require_acceptance: false,
        }
    }
}

impl WorkflowConfig {
    /// Create a config with a specific track count.
    pub fn with_tracks(mut self, tracks: usize) -> Self {
        self.tracks = tracks.max(1);
        self
    }

    /// Set the default max cycles.
    pub fn with_default_max_cycles(mut self, max_cycles: u32) -> Self {
        self.default_max_cycles = max_cycles;
        self
    }

    /// Set the per-phase budget ceiling.
    pub fn with_phase_budget(mut self, budget_usd: f64) -> Self {
        self.phase_budget_usd = budget_usd;
        self
    }

    /// Enable or disable fail-fast mode.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Require a workflow-acceptance decision before wave 1 is released.
    pub fn with_acceptance_gate(mut self, require: bool) -> Self {
        self.require_acceptance = require;
        self
    }
}
