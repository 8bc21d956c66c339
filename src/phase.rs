//! Phase definition and lifecycle status types.
//!
//! A phase is one node in the workflow dependency graph: an iterative unit
//! of work with its own retry and budget limits. Phases are created from a
//! [`PhaseSpec`] at plan time and mutated by the lifecycle controller
//! (status, cycles, cost) and by hot-edit operations. Phases are never
//! deleted during a run; Skipped and Failed are terminal states, not
//! removals.

use serde::{Deserialize, Serialize};

/// Status of a phase in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Phase is waiting for its dependencies to finish.
    #[default]
    Waiting,
    /// Phase is running its coder/reviewer cycle loop.
    Working,
    /// Phase completed successfully.
    Done,
    /// Phase failed terminally (max cycles, budget, or gate rejection).
    Failed,
    /// Phase is suspended at a checkpoint pending a decision.
    Gate,
    /// Phase was skipped by an explicit operator action.
    Skipped,
}

impl PhaseStatus {
    /// Check if the phase is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    /// Check if this status releases downstream phases for scheduling.
    ///
    /// Skipped counts as a release but is tallied separately from Done in
    /// result summaries.
    pub fn releases_dependents(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }
}

/// Input specification for a phase, consumed at plan time or via hot-add.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseSpec {
    /// Unique, stable phase id (e.g. "setup", "03-auth").
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Task description consumed by the agent.
    #[serde(default)]
    pub spec_body: String,
    /// Ids of phases that must finish before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Max coder/reviewer cycles before the phase fails. Zero means
    /// "use the workflow default".
    #[serde(default)]
    pub max_cycles: u32,
}

impl PhaseSpec {
    pub fn new(id: &str, title: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            spec_body: String::new(),
            depends_on,
            max_cycles: 0,
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.spec_body = body.to_string();
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: u32) -> Self {
        self.max_cycles = max_cycles;
        self
    }
}

/// A single phase with its live execution state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    /// Unique, stable phase id.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Ids of phases that must finish before this one starts.
    pub depends_on: Vec<String>,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: PhaseStatus,
    /// Wave assigned by the graph builder. Waves are 1-based; 0 means
    /// "not yet leveled". Invariant: strictly greater than the wave of
    /// every phase in `depends_on`.
    #[serde(default)]
    pub wave: usize,
    /// Cycles consumed so far.
    #[serde(default)]
    pub cycles: u32,
    /// Allowed cycles before the phase fails.
    pub max_cycles: u32,
    /// Accumulated spend in USD.
    #[serde(default)]
    pub cost_usd: f64,
    /// Task description consumed by the agent.
    #[serde(default)]
    pub spec_body: String,
    /// A specification edit was applied mid-run.
    #[serde(default)]
    pub refactored: bool,
    /// Spec edits queued while a cycle is in flight, drained at the next
    /// cycle boundary.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_edits: Vec<String>,
}

impl Phase {
    /// Create a phase from its spec, resolving a zero max-cycles budget
    /// against the workflow default.
    pub fn from_spec(spec: PhaseSpec, default_max_cycles: u32) -> Self {
        let max_cycles = if spec.max_cycles == 0 {
            default_max_cycles
        } else {
            spec.max_cycles
        };
        Self {
            id: spec.id,
            title: spec.title,
            depends_on: spec.depends_on,
            status: PhaseStatus::Waiting,
            wave: 0,
            cycles: 0,
            max_cycles,
            cost_usd: 0.0,
            spec_body: spec.spec_body,
            refactored: false,
            pending_edits: Vec::new(),
        }
    }

    /// Queue a spec edit to be applied at the next cycle boundary.
    pub fn queue_edit(&mut self, new_body: String) {
        self.pending_edits.push(new_body);
    }

    /// Apply queued edits, if any. Returns true when an edit was applied;
    /// the phase is marked refactored for the following cycle.
    pub fn drain_pending_edits(&mut self) -> bool {
        match self.pending_edits.pop() {
            Some(body) => {
                // Later edits supersede earlier ones.
                self.pending_edits.clear();
                self.spec_body = body;
                self.refactored = true;
                true
            }
            None => false,
        }
    }
}

/// Severity of a plan risk.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    /// Informational observation.
    Info,
    /// Configuration smell worth reviewing (e.g. unknown dependency id).
    #[default]
    Warning,
    /// Actionable problem (missing or conflicting contract).
    Error,
}

impl std::fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// An actionable risk entry attached to the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub severity: RiskSeverity,
    pub phase_id: String,
    pub message: String,
}

impl Risk {
    pub fn new(severity: RiskSeverity, phase_id: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            phase_id: phase_id.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(phase_id: &str, message: impl Into<String>) -> Self {
        Self::new(RiskSeverity::Warning, phase_id, message)
    }

    pub fn error(phase_id: &str, message: impl Into<String>) -> Self {
        Self::new(RiskSeverity::Error, phase_id, message)
    }
}
