//! Phase lifecycle controller.
//!
//! Drives one phase through Waiting -> Working -> {Done, Failed, Gate,
//! Skipped}, enforcing the cycle limit and budget ceiling. Each loop
//! iteration is one coder/reviewer cycle; hot edits and cancellation are
//! observed only at cycle boundaries so an in-flight cycle is never
//! corrupted. An escalating reviewer verdict suspends the phase on a gate
//! rendezvous without blocking the scheduler or sibling phases.

use crate::agent::{CycleAgent, CycleVerdict};
use crate::config::WorkflowConfig;
use crate::discovery::BeadTree;
use crate::errors::{GateError, PhaseError};
use crate::events::{EventSink, WorkflowEvent};
use crate::gate::{self, CheckpointScope, GateAction, OpenCheckpoint};
use crate::phase::PhaseStatus;
use crate::workflow::plan::Plan;
use crate::workflow::state::PhaseOutcome;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a phase worker task needs.
#[derive(Clone)]
pub(crate) struct PhaseContext {
    pub plan: Arc<Mutex<Plan>>,
    pub agent: Arc<dyn CycleAgent>,
    pub config: WorkflowConfig,
    pub events: EventSink,
    pub cancel: CancellationToken,
    /// Registry channel: open checkpoints go to the executor so that
    /// gate-decision commands can find them.
    pub checkpoints: mpsc::Sender<OpenCheckpoint>,
}

impl PhaseContext {
    async fn set_status(&self, phase_id: &str, status: PhaseStatus) {
        {
            let mut plan = self.plan.lock().await;
            plan.set_status(phase_id, status);
        }
        self.events
            .emit(WorkflowEvent::StatusChanged {
                phase: phase_id.to_string(),
                status,
            })
            .await;
    }
}

/// Run one phase's cycle loop to a stopping point.
///
/// Returns the phase's outcome; terminal failures are recorded on the
/// outcome and never propagate to sibling phases.
pub(crate) async fn run_phase(ctx: PhaseContext, phase_id: String) -> PhaseOutcome {
    let mut beads = BeadTree::for_phase(&phase_id);
    let mut error: Option<String> = None;

    loop {
        // Cycle boundary: the only place cancellation and hot edits are
        // observed.
        if ctx.cancel.is_cancelled() {
            error = Some("workflow canceled at cycle boundary".to_string());
            break;
        }

        let snapshot = {
            let mut plan = ctx.plan.lock().await;
            let Some(phase) = plan.phase_mut(&phase_id) else {
                error = Some(format!("phase {} vanished from plan", phase_id));
                break;
            };
            if phase.drain_pending_edits() {
                debug!(phase = %phase_id, "applied pending spec edit at cycle boundary");
            }
            phase.cycles += 1;
            if phase.cycles > phase.max_cycles {
                let err = PhaseError::MaxCyclesExceeded {
                    phase: phase_id.clone(),
                    max_cycles: phase.max_cycles,
                };
                error = Some(err.to_string());
                drop(plan);
                ctx.set_status(&phase_id, PhaseStatus::Failed).await;
                break;
            }
            phase.clone()
        };
        let cycle = snapshot.cycles;

        let outcome = match ctx.agent.run_cycle(&snapshot, cycle).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = PhaseError::CycleFailed {
                    phase: phase_id.clone(),
                    message: e.to_string(),
                };
                error = Some(err.to_string());
                ctx.set_status(&phase_id, PhaseStatus::Failed).await;
                break;
            }
        };

        // Diff capture is best-effort telemetry for the display layer.
        let _diff = ctx.agent.capture_diff(&snapshot).await.unwrap_or_default();

        beads.record_cycle(cycle, &outcome.issues);

        let (spent, over_budget) = {
            let mut plan = ctx.plan.lock().await;
            match plan.phase_mut(&phase_id) {
                Some(phase) => {
                    phase.cost_usd += outcome.cost_usd;
                    (phase.cost_usd, phase.cost_usd > ctx.config.phase_budget_usd)
                }
                None => (0.0, false),
            }
        };

        ctx.events
            .emit(WorkflowEvent::CycleCompleted {
                phase: phase_id.clone(),
                cycle,
                max_cycles: snapshot.max_cycles,
                cost_usd: spent,
                issues_found: outcome.issues.len(),
            })
            .await;

        if over_budget {
            let err = PhaseError::BudgetExceeded {
                phase: phase_id.clone(),
                spent,
                ceiling: ctx.config.phase_budget_usd,
            };
            error = Some(err.to_string());
            ctx.set_status(&phase_id, PhaseStatus::Failed).await;
            break;
        }

        match outcome.verdict {
            CycleVerdict::Approved => {
                ctx.set_status(&phase_id, PhaseStatus::Done).await;
                break;
            }
            CycleVerdict::Revise => continue,
            CycleVerdict::Escalate => {
                match gate_rendezvous(&ctx, &phase_id, &outcome_reason(&outcome)).await {
                    Ok(GateAction::Accept) => {
                        ctx.set_status(&phase_id, PhaseStatus::Done).await;
                        break;
                    }
                    Ok(GateAction::Reject) => {
                        error = Some(
                            PhaseError::GateRejected {
                                phase: phase_id.clone(),
                            }
                            .to_string(),
                        );
                        ctx.set_status(&phase_id, PhaseStatus::Failed).await;
                        break;
                    }
                    Ok(GateAction::Retry) => {
                        ctx.set_status(&phase_id, PhaseStatus::Working).await;
                        continue;
                    }
                    Ok(GateAction::Skip) => {
                        ctx.set_status(&phase_id, PhaseStatus::Skipped).await;
                        break;
                    }
                    Err(GateError::Canceled) => {
                        // Our own failure path, not a decision; the phase
                        // stays at its gate in the final record.
                        error = Some(GateError::Canceled.to_string());
                        break;
                    }
                    Err(e) => {
                        error = Some(e.to_string());
                        ctx.set_status(&phase_id, PhaseStatus::Failed).await;
                        break;
                    }
                }
            }
        }
    }

    let plan = ctx.plan.lock().await;
    let (status, cycles, cost_usd) = match plan.phase(&phase_id) {
        Some(phase) => (phase.status, phase.cycles, phase.cost_usd),
        None => (PhaseStatus::Failed, 0, 0.0),
    };
    PhaseOutcome {
        phase: phase_id,
        status,
        cycles,
        cost_usd,
        error,
        beads: Some(beads),
    }
}

fn outcome_reason(outcome: &crate::agent::CycleOutcome) -> String {
    outcome
        .issues
        .first()
        .map(|i| i.summary.clone())
        .unwrap_or_else(|| "reviewer escalation".to_string())
}

/// Suspend this phase on a checkpoint and wait for the decision.
///
/// The executor announces the checkpoint once it is registered, so a
/// decision sent in reaction to the announcement always finds it.
async fn gate_rendezvous(
    ctx: &PhaseContext,
    phase_id: &str,
    reason: &str,
) -> Result<GateAction, GateError> {
    ctx.set_status(phase_id, PhaseStatus::Gate).await;

    let (open_cp, wait) = gate::open(phase_id, CheckpointScope::Phase, reason);
    if ctx.checkpoints.send(open_cp).await.is_err() {
        // Executor went away; nobody can ever decide.
        return Err(GateError::Abandoned);
    }

    wait.wait(&ctx.cancel).await
}
