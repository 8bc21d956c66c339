//! Events emitted during workflow execution.
//!
//! The core emits one event per state transition over an `mpsc` channel;
//! rendering them is the display layer's problem. Sends are best-effort:
//! a dropped listener never stalls execution.

use crate::discovery::Discovery;
use crate::gate::{Checkpoint, GateAction};
use crate::ledger::ContractReport;
use crate::phase::{PhaseStatus, Risk};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Notifications emitted by the executor, one per state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The graph builder assigned a phase to a wave.
    WaveAssigned { phase: String, wave: usize },
    /// A phase changed lifecycle status.
    StatusChanged { phase: String, status: PhaseStatus },
    /// A coder/reviewer cycle finished; cycle and cost telemetry.
    CycleCompleted {
        phase: String,
        cycle: u32,
        max_cycles: u32,
        cost_usd: f64,
        issues_found: usize,
    },
    /// A checkpoint opened; a decision is pending.
    CheckpointOpened { checkpoint: Checkpoint },
    /// A checkpoint received its decision.
    CheckpointResolved {
        checkpoint_id: String,
        phase: String,
        action: GateAction,
    },
    /// A phase published an interface contract.
    ContractPublished { producer: String, name: String },
    /// The contract ledger was reconciled.
    ContractReconciled { report: Box<ContractReport> },
    /// A risk entry was raised on the plan.
    RiskRaised { risk: Risk },
    /// A phase posted a discovery.
    DiscoveryPosted { discovery: Discovery },
    /// The run finished, with per-outcome counts.
    WorkflowCompleted {
        done: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Best-effort event emitter around an optional channel.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<WorkflowEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, event: WorkflowEvent) {
        if let Some(ref tx) = self.tx {
            tx.send(event).await.ok();
        }
    }
}
