//! Workflow orchestration over a dependency graph of iterative phases.
//!
//! Phases are leveled into execution waves, run concurrently up to a
//! track limit, and driven through coder/reviewer cycles with per-phase
//! retry and budget ceilings. A phase can suspend on a gate checkpoint
//! without blocking its siblings, interface contracts between phases are
//! reconciled against wave order, and the running graph accepts hot-added
//! and hot-edited phases between cycles.

pub mod agent;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod gate;
pub mod graph;
pub mod ledger;
pub mod phase;
pub mod workflow;

pub use agent::{CycleAgent, CycleIssue, CycleOutcome, CycleVerdict, DiffSummary};
pub use config::WorkflowConfig;
pub use discovery::{Discovery, DiscoveryBoard, DiscoveryKind, Hail};
pub use errors::{GateError, GraphError, PhaseError, WorkflowError};
pub use events::{EventSink, WorkflowEvent};
pub use gate::{Checkpoint, CheckpointScope, GateAction, OpenCheckpoint};
pub use ledger::{ContractLedger, ContractReport, Entanglement, EntanglementKind};
pub use phase::{Phase, PhaseSpec, PhaseStatus, Risk, RiskSeverity};
pub use workflow::{
    ExecutionReport, Plan, PlanStats, WorkflowExecutor, WorkflowHandle, WorkflowSummary,
};
