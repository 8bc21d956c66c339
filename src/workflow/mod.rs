//! Workflow orchestration: plan, lifecycle control, and execution.
//!
//! Submodules:
//! - `plan`: the validated, wave-partitioned plan and its mid-run
//!   mutation operations (hot-add, hot-edit, contract declarations)
//! - `controller`: drives one phase through its coder/reviewer cycle
//!   loop, including gate rendezvous
//! - `executor`: owns the run loop, concurrency tracks, checkpoint
//!   registry, and the command channel
//! - `state`: per-phase outcomes and the final run summary

pub(crate) mod controller;
pub mod executor;
pub mod plan;
pub mod state;

pub use executor::{ExecutionReport, WorkflowCommand, WorkflowExecutor, WorkflowHandle};
pub use plan::{Plan, PlanStats};
pub use state::{PhaseOutcome, WorkflowSummary};
