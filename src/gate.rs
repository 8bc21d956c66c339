//! Gate rendezvous: suspending one phase on an external decision.
//!
//! A phase that reaches a decision point opens exactly one checkpoint and
//! blocks its own task on a one-shot reply, leaving the scheduler and
//! sibling phases untouched. The reply channel delivers at most one
//! [`GateAction`] and is never reused; cancellation of the governing
//! token resolves the wait with [`GateError::Canceled`] instead of an
//! action.
//!
//! The top-level workflow-acceptance checkpoint uses the same mechanism
//! with [`CheckpointScope::Workflow`] and a reduced action set
//! {Accept, Skip}, since there is no prior attempt to retry or reject.

use crate::errors::GateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Decision delivered to a waiting checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    /// Approve the work; the phase completes.
    Accept,
    /// Reject the work; the phase fails.
    Reject,
    /// Send the phase back for another cycle.
    Retry,
    /// Skip the phase entirely.
    Skip,
}

impl std::fmt::Display for GateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Retry => "retry",
            Self::Skip => "skip",
        };
        write!(f, "{}", s)
    }
}

/// Whether a checkpoint gates one phase or the whole workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointScope {
    /// Top-level workflow acceptance before wave 1 is released.
    Workflow,
    /// A single phase suspended mid-run.
    Phase,
}

impl CheckpointScope {
    /// Check whether an action is legal for this scope. Workflow
    /// acceptance has nothing to retry or reject.
    pub fn allows(&self, action: GateAction) -> bool {
        match self {
            Self::Workflow => matches!(action, GateAction::Accept | GateAction::Skip),
            Self::Phase => true,
        }
    }
}

impl std::fmt::Display for CheckpointScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Workflow => "workflow",
            Self::Phase => "phase",
        };
        write!(f, "{}", s)
    }
}

/// Serializable description of a suspension point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub phase_id: String,
    pub scope: CheckpointScope,
    /// Why the phase stopped here, for whoever decides.
    pub reason: String,
    pub opened_at: DateTime<Utc>,
}

/// The decision side of an open checkpoint. The reply channel delivers
/// at most one action; a checkpoint cannot be answered twice.
#[derive(Debug)]
pub struct OpenCheckpoint {
    pub checkpoint: Checkpoint,
    responder: Option<oneshot::Sender<GateAction>>,
}

impl OpenCheckpoint {
    /// Deliver the decision. Fails with `InvalidAction` if the action is
    /// not legal for the checkpoint's scope (leaving the checkpoint open
    /// for a legal decision), and with `Abandoned` if the waiting phase
    /// has already gone away or a decision was already delivered.
    pub fn resolve(&mut self, action: GateAction) -> Result<(), GateError> {
        if !self.checkpoint.scope.allows(action) {
            return Err(GateError::InvalidAction {
                action: action.to_string(),
                scope: self.checkpoint.scope.to_string(),
            });
        }
        let responder = self.responder.take().ok_or(GateError::Abandoned)?;
        responder.send(action).map_err(|_| GateError::Abandoned)
    }
}

/// The waiting side of an open checkpoint.
#[derive(Debug)]
pub struct GateWait {
    rx: oneshot::Receiver<GateAction>,
}

impl GateWait {
    /// Block this phase's task until a decision arrives or the governing
    /// token is canceled. Cancellation yields [`GateError::Canceled`] and
    /// never a `GateAction`.
    pub async fn wait(self, cancel: &CancellationToken) -> Result<GateAction, GateError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(GateError::Canceled),
            decision = self.rx => decision.map_err(|_| GateError::Abandoned),
        }
    }
}

/// Open a checkpoint, returning the decision side and the waiting side.
pub fn open(phase_id: &str, scope: CheckpointScope, reason: &str) -> (OpenCheckpoint, GateWait) {
    let (tx, rx) = oneshot::channel();
    let checkpoint = Checkpoint {
        id: uuid::Uuid::new_v4().to_string(),
        phase_id: phase_id.to_string(),
        scope,
        reason: reason.to_string(),
        opened_at: Utc::now(),
    };
    (
        OpenCheckpoint {
            checkpoint,
            responder: Some(tx),
        },
        GateWait { rx },
    )
}
