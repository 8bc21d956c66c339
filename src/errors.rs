//! Typed error hierarchy for the Conductor orchestrator.
//!
//! Four top-level enums cover the four subsystems:
//! - `GraphError` — dependency graph construction and wave leveling failures
//! - `PhaseError` — per-phase terminal failures
//! - `GateError` — checkpoint rendezvous failures
//! - `WorkflowError` — executor and command-surface failures

use thiserror::Error;

/// Errors from graph construction and wave leveling.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Cycle detected in phase dependencies. Involved phases: {phases:?}")]
    CyclicGraph { phases: Vec<String> },

    #[error("Duplicate phase id: {id}")]
    DuplicatePhase { id: String },
}

/// Terminal failures of a single phase.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase {phase} exceeded max cycles ({max_cycles}) without approval")]
    MaxCyclesExceeded { phase: String, max_cycles: u32 },

    #[error("Phase {phase} exceeded budget: spent ${spent:.2} of ${ceiling:.2}")]
    BudgetExceeded {
        phase: String,
        spent: f64,
        ceiling: f64,
    },

    #[error("Gate rejected phase {phase}")]
    GateRejected { phase: String },

    #[error("Agent cycle failed for phase {phase}: {message}")]
    CycleFailed { phase: String, message: String },

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Errors from the gate rendezvous.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Gate wait canceled before a decision arrived")]
    Canceled,

    #[error("Decision consumer dropped the checkpoint without responding")]
    Abandoned,

    #[error("Action {action} is not valid for a {scope} checkpoint")]
    InvalidAction { action: String, scope: String },

    #[error("No pending checkpoint with id {id}")]
    UnknownCheckpoint { id: String },
}

/// Errors from the workflow executor and its command surface.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Unknown phase id: {id}")]
    UnknownPhase { id: String },

    #[error("Adding phase {id} would create a dependency cycle")]
    WouldCycle { id: String },

    #[error("Workflow command channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
