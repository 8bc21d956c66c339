//! Workflow executor: wave-gated parallel phase execution.
//!
//! The executor owns all shared run state (plan, checkpoint registry,
//! discovery board) and drives phase workers as independent tokio tasks.
//! Concurrency is bounded by the configured track count, not by wave
//! width: a wave wider than the track limit queues the excess until a
//! slot frees. Mid-run commands (hot-add, hot-edit, gate decisions,
//! contract declarations, cancel) arrive over an mpsc handle and are
//! applied against the live plan under its lock.
//!
//! Cancellation stops releasing new phases and unblocks every
//! outstanding gate wait; already-Working phases run to their next cycle
//! boundary instead of being killed mid-cycle.

use crate::agent::CycleAgent;
use crate::config::WorkflowConfig;
use crate::discovery::{Discovery, DiscoveryBoard, DiscoveryKind, Hail};
use crate::errors::{GateError, WorkflowError};
use crate::events::{EventSink, WorkflowEvent};
use crate::gate::{self, CheckpointScope, GateAction, OpenCheckpoint};
use crate::ledger::Entanglement;
use crate::phase::{PhaseSpec, PhaseStatus, Risk};
use crate::workflow::controller::{PhaseContext, run_phase};
use crate::workflow::plan::Plan;
use crate::workflow::state::{ExecutionTimer, PhaseOutcome, WorkflowSummary};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Inbound commands accepted while a workflow runs.
#[derive(Debug)]
pub enum WorkflowCommand {
    /// Add a phase to the running workflow.
    HotAddPhase { spec: PhaseSpec },
    /// Replace a phase's spec body; applied at the next cycle boundary
    /// if the phase is mid-cycle.
    HotEditPhase { id: String, new_body: String },
    /// Deliver a decision to a pending checkpoint.
    GateDecision {
        checkpoint_id: String,
        action: GateAction,
    },
    /// Publish an interface contract on behalf of a producer phase.
    PublishContract {
        producer: String,
        entanglement: Entanglement,
    },
    /// Declare a consumer phase's dependency on a named contract.
    RequireContract { consumer: String, name: String },
    /// Post a fire-and-forget discovery.
    PostDiscovery { discovery: Discovery },
    /// Post a discovery that may block for a human reply.
    Hail { hail: Hail },
    /// Cancel the whole workflow.
    Cancel,
}

/// Cloneable handle for sending commands into a running workflow.
#[derive(Clone)]
pub struct WorkflowHandle {
    tx: mpsc::Sender<WorkflowCommand>,
}

impl WorkflowHandle {
    async fn send(&self, cmd: WorkflowCommand) -> Result<(), WorkflowError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| WorkflowError::ChannelClosed)
    }

    pub async fn hot_add(&self, spec: PhaseSpec) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::HotAddPhase { spec }).await
    }

    pub async fn hot_edit(&self, id: &str, new_body: &str) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::HotEditPhase {
            id: id.to_string(),
            new_body: new_body.to_string(),
        })
        .await
    }

    pub async fn gate_decision(
        &self,
        checkpoint_id: &str,
        action: GateAction,
    ) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::GateDecision {
            checkpoint_id: checkpoint_id.to_string(),
            action,
        })
        .await
    }

    pub async fn publish_contract(
        &self,
        producer: &str,
        entanglement: Entanglement,
    ) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::PublishContract {
            producer: producer.to_string(),
            entanglement,
        })
        .await
    }

    pub async fn require_contract(&self, consumer: &str, name: &str) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::RequireContract {
            consumer: consumer.to_string(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn post_discovery(&self, discovery: Discovery) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::PostDiscovery { discovery }).await
    }

    /// Post a discovery that expects a synchronous free-text reply.
    pub async fn hail(
        &self,
        discovery: Discovery,
    ) -> Result<oneshot::Receiver<String>, WorkflowError> {
        let (hail, rx) = Hail::expecting_reply(discovery);
        self.send(WorkflowCommand::Hail { hail }).await?;
        Ok(rx)
    }

    pub async fn cancel(&self) -> Result<(), WorkflowError> {
        self.send(WorkflowCommand::Cancel).await
    }
}

/// Result of a workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// True when every phase finished Done.
    pub success: bool,
    pub summary: WorkflowSummary,
    /// Final plan snapshot: phases, waves, ledger, report, risks.
    pub plan: Plan,
    /// Every discovery posted during the run.
    pub discoveries: DiscoveryBoard,
}

/// The workflow executor.
pub struct WorkflowExecutor {
    config: WorkflowConfig,
    agent: Arc<dyn CycleAgent>,
    events: EventSink,
    hails: Option<mpsc::Sender<Hail>>,
    cmd_tx: mpsc::Sender<WorkflowCommand>,
    cmd_rx: mpsc::Receiver<WorkflowCommand>,
    cancel: CancellationToken,
}

/// Shared run-loop state, mutated only from the executor task.
struct RunState {
    plan: Arc<Mutex<Plan>>,
    registry: HashMap<String, OpenCheckpoint>,
    board: DiscoveryBoard,
    events: EventSink,
    config: WorkflowConfig,
    hails: Option<mpsc::Sender<Hail>>,
    cancel: CancellationToken,
    /// Highest wave any phase has started in; earlier waves are frozen.
    highest_started_wave: usize,
    /// Workers actively cycling. Gate-suspended phases are excluded: a
    /// suspended phase gives its track back until the decision lands.
    working: usize,
    /// Phases currently suspended at a checkpoint.
    gated: HashSet<String>,
    /// Retry decisions waiting for a free track before they resume.
    resume_queue: VecDeque<OpenCheckpoint>,
}

impl WorkflowExecutor {
    pub fn new(config: WorkflowConfig, agent: Arc<dyn CycleAgent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        Self {
            config,
            agent,
            events: EventSink::disabled(),
            hails: None,
            cmd_tx,
            cmd_rx,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the event channel for outbound notifications.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Set the channel that receives hails (with their reply senders).
    pub fn with_hail_channel(mut self, tx: mpsc::Sender<Hail>) -> Self {
        self.hails = Some(tx);
        self
    }

    /// Get a command handle usable while `run` is in flight.
    pub fn handle(&self) -> WorkflowHandle {
        WorkflowHandle {
            tx: self.cmd_tx.clone(),
        }
    }

    /// The cancellation token governing this run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the workflow to completion, cancellation, or deadlock.
    pub async fn run(
        mut self,
        name: &str,
        specs: Vec<PhaseSpec>,
    ) -> Result<ExecutionReport, WorkflowError> {
        let timer = ExecutionTimer::start();
        let plan = Plan::build(name, specs, &self.config)?;
        info!(
            workflow = name,
            phases = plan.stats.total_phases,
            waves = plan.stats.total_waves,
            "plan built"
        );

        for phase in plan.phases() {
            self.events
                .emit(WorkflowEvent::WaveAssigned {
                    phase: phase.id.clone(),
                    wave: phase.wave,
                })
                .await;
        }
        for risk in &plan.risks {
            self.events
                .emit(WorkflowEvent::RiskRaised { risk: risk.clone() })
                .await;
        }

        let total_phases = plan.phases().len();
        let mut summary = WorkflowSummary::new(total_phases);
        let mut state = RunState {
            plan: Arc::new(Mutex::new(plan)),
            registry: HashMap::new(),
            board: DiscoveryBoard::new(),
            events: self.events.clone(),
            config: self.config.clone(),
            hails: self.hails.clone(),
            cancel: self.cancel.clone(),
            highest_started_wave: 0,
            working: 0,
            gated: HashSet::new(),
            resume_queue: VecDeque::new(),
        };

        let (cp_tx, mut cp_rx) = mpsc::channel::<OpenCheckpoint>(32);
        let (result_tx, mut result_rx) = mpsc::channel::<PhaseOutcome>(32);

        let mut accepted = !self.config.require_acceptance;
        let mut acceptance = None;
        if self.config.require_acceptance {
            let (open_cp, wait) = gate::open(name, CheckpointScope::Workflow, "accept workflow plan");
            let descriptor = open_cp.checkpoint.clone();
            state.registry.insert(descriptor.id.clone(), open_cp);
            self.events
                .emit(WorkflowEvent::CheckpointOpened {
                    checkpoint: descriptor,
                })
                .await;
            let cancel = self.cancel.clone();
            acceptance = Some(Box::pin(async move { wait.wait(&cancel).await }));
        }

        let mut canceled = false;

        loop {
            // Release phase workers up to the track limit.
            if accepted && !canceled && !self.cancel.is_cancelled() {
                // Retry decisions re-admit suspended phases through the
                // same slot check as fresh releases, ahead of the queue.
                while state.working < self.config.tracks {
                    let Some(mut open_cp) = state.resume_queue.pop_front() else {
                        break;
                    };
                    let phase = open_cp.checkpoint.phase_id.clone();
                    let checkpoint_id = open_cp.checkpoint.id.clone();
                    if open_cp.resolve(GateAction::Retry).is_ok() {
                        state.gated.remove(&phase);
                        state.working += 1;
                        debug!(phase = %phase, "gated phase resumed");
                        self.events
                            .emit(WorkflowEvent::CheckpointResolved {
                                checkpoint_id,
                                phase,
                                action: GateAction::Retry,
                            })
                            .await;
                    }
                    // A failed resolve means the waiter is already gone;
                    // its outcome cleans up the gated entry.
                }

                let ready = { state.plan.lock().await.releasable() };
                for id in ready {
                    if state.working >= self.config.tracks {
                        break;
                    }
                    let wave = {
                        let mut plan = state.plan.lock().await;
                        plan.set_status(&id, PhaseStatus::Working);
                        plan.phase(&id).map(|p| p.wave).unwrap_or(0)
                    };
                    state.highest_started_wave = state.highest_started_wave.max(wave);
                    self.events
                        .emit(WorkflowEvent::StatusChanged {
                            phase: id.clone(),
                            status: PhaseStatus::Working,
                        })
                        .await;
                    debug!(phase = %id, wave, "phase released");

                    let ctx = PhaseContext {
                        plan: state.plan.clone(),
                        agent: self.agent.clone(),
                        config: self.config.clone(),
                        events: self.events.clone(),
                        cancel: self.cancel.clone(),
                        checkpoints: cp_tx.clone(),
                    };
                    let result_tx = result_tx.clone();
                    tokio::spawn(async move {
                        let outcome = run_phase(ctx, id).await;
                        result_tx.send(outcome).await.ok();
                    });
                    state.working += 1;
                }
            }

            // Termination checks: done, canceled and drained, or
            // deadlocked with nothing left to make progress. A phase
            // suspended at a gate still counts as pending work.
            {
                let plan = state.plan.lock().await;
                if plan.is_complete() && state.working == 0 && state.gated.is_empty() {
                    break;
                }
                if state.working == 0 && state.gated.is_empty() {
                    if canceled {
                        break;
                    }
                    if accepted && acceptance.is_none() && plan.releasable().is_empty() {
                        // Phases stuck Waiting on a Failed dependency can
                        // never release without fail_fast.
                        break;
                    }
                }
            }

            tokio::select! {
                decision = async {
                    match acceptance.as_mut() {
                        Some(fut) => fut.await,
                        None => std::future::pending().await,
                    }
                }, if acceptance.is_some() => {
                    acceptance = None;
                    match decision {
                        Ok(GateAction::Accept) => {
                            accepted = true;
                        }
                        Ok(_) => {
                            // Workflow scope only admits Accept and Skip.
                            let skipped = {
                                let mut plan = state.plan.lock().await;
                                let ids: Vec<String> = plan
                                    .phases()
                                    .iter()
                                    .filter(|p| p.status == PhaseStatus::Waiting)
                                    .map(|p| p.id.clone())
                                    .collect();
                                for id in &ids {
                                    plan.set_status(id, PhaseStatus::Skipped);
                                }
                                ids
                            };
                            for id in skipped {
                                self.events
                                    .emit(WorkflowEvent::StatusChanged {
                                        phase: id,
                                        status: PhaseStatus::Skipped,
                                    })
                                    .await;
                            }
                        }
                        Err(_) => {
                            canceled = true;
                            summary.canceled = true;
                        }
                    }
                }
                Some(outcome) = result_rx.recv() => {
                    // A worker that exited mid-gate (cancellation) gave
                    // its track back when the checkpoint opened.
                    if !state.gated.remove(&outcome.phase) {
                        state.working -= 1;
                    }
                    debug!(phase = %outcome.phase, status = ?outcome.status, "phase finished");
                    if self.config.fail_fast && outcome.status == PhaseStatus::Failed {
                        skip_dependents(&mut state, &outcome.phase).await;
                    }
                    summary.record(outcome);
                }
                Some(open_cp) = cp_rx.recv() => {
                    // A checkpoint can arrive after its worker already
                    // bailed out (cancellation); only live workers give
                    // a track back.
                    let phase_id = open_cp.checkpoint.phase_id.clone();
                    if open_cp.checkpoint.scope == CheckpointScope::Phase
                        && !summary.outcomes.contains_key(&phase_id)
                    {
                        // Suspended phases never occupy a track.
                        state.working -= 1;
                        state.gated.insert(phase_id);
                    }
                    let descriptor = open_cp.checkpoint.clone();
                    state
                        .registry
                        .insert(descriptor.id.clone(), open_cp);
                    // Announced only once the registry can match a
                    // decision, so a client reacting to this event can
                    // never race the insert.
                    self.events
                        .emit(WorkflowEvent::CheckpointOpened {
                            checkpoint: descriptor,
                        })
                        .await;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    handle_command(&mut state, cmd).await;
                }
                _ = self.cancel.cancelled(), if !canceled => {
                    canceled = true;
                    summary.canceled = true;
                    info!("workflow canceled; draining working phases");
                }
            }
        }

        // Final bookkeeping under one lock: reconcile, fill outcomes for
        // phases that never got a worker, and tally.
        let final_plan = {
            let mut plan = state.plan.lock().await;
            plan.reconcile_contracts();
            for phase in plan.phases() {
                if !summary.outcomes.contains_key(&phase.id) {
                    summary.record(PhaseOutcome {
                        phase: phase.id.clone(),
                        status: phase.status,
                        cycles: phase.cycles,
                        cost_usd: phase.cost_usd,
                        error: None,
                        beads: None,
                    });
                }
            }
            // Hot-adds may have grown the phase set since the run began.
            summary.total_phases = plan.phases().len();
            summary.set_counts(plan.outcome_counts());
            summary.total_cost_usd = plan.total_cost();
            plan.clone()
        };
        summary.duration = timer.elapsed();

        self.events
            .emit(WorkflowEvent::ContractReconciled {
                report: Box::new(final_plan.report.clone()),
            })
            .await;
        self.events
            .emit(WorkflowEvent::WorkflowCompleted {
                done: summary.done,
                failed: summary.failed,
                skipped: summary.skipped,
            })
            .await;

        let success = !summary.canceled && summary.all_done();
        Ok(ExecutionReport {
            success,
            summary,
            plan: final_plan,
            discoveries: state.board,
        })
    }
}

/// Skip every non-started transitive dependent of a failed phase.
async fn skip_dependents(state: &mut RunState, failed_id: &str) {
    let skipped = {
        let mut plan = state.plan.lock().await;
        let mut frontier = vec![failed_id.to_string()];
        let mut skipped = Vec::new();
        while let Some(current) = frontier.pop() {
            let dependents: Vec<String> = plan
                .phases()
                .iter()
                .filter(|p| {
                    p.status == PhaseStatus::Waiting && p.depends_on.contains(&current)
                })
                .map(|p| p.id.clone())
                .collect();
            for id in dependents {
                plan.set_status(&id, PhaseStatus::Skipped);
                frontier.push(id.clone());
                skipped.push(id);
            }
        }
        skipped
    };
    for id in skipped {
        state
            .events
            .emit(WorkflowEvent::StatusChanged {
                phase: id,
                status: PhaseStatus::Skipped,
            })
            .await;
    }
}

/// Apply one inbound command against the live run state.
async fn handle_command(state: &mut RunState, cmd: WorkflowCommand) {
    match cmd {
        WorkflowCommand::HotAddPhase { spec } => {
            let floor = state.highest_started_wave + 1;
            let id = spec.id.clone();
            let added = {
                let mut plan = state.plan.lock().await;
                match plan.hot_add(spec, state.config.default_max_cycles, floor) {
                    Ok(wave) => {
                        let report = plan.reconcile_contracts();
                        Ok((wave, report))
                    }
                    Err(e) => {
                        let risk = Risk::error(&id, e.to_string());
                        plan.push_risk(risk.clone());
                        Err(risk)
                    }
                }
            };
            match added {
                Ok((wave, report)) => {
                    debug!(phase = %id, wave, "hot-added phase");
                    state
                        .events
                        .emit(WorkflowEvent::WaveAssigned { phase: id, wave })
                        .await;
                    state
                        .events
                        .emit(WorkflowEvent::ContractReconciled {
                            report: Box::new(report),
                        })
                        .await;
                }
                Err(risk) => {
                    state.events.emit(WorkflowEvent::RiskRaised { risk }).await;
                }
            }
        }
        WorkflowCommand::HotEditPhase { id, new_body } => {
            let result = {
                let mut plan = state.plan.lock().await;
                plan.hot_edit(&id, &new_body)
            };
            match result {
                Ok(queued) => {
                    debug!(phase = %id, queued, "hot edit recorded");
                }
                Err(e) => {
                    let risk = Risk::warning(&id, e.to_string());
                    {
                        let mut plan = state.plan.lock().await;
                        plan.push_risk(risk.clone());
                    }
                    state.events.emit(WorkflowEvent::RiskRaised { risk }).await;
                }
            }
        }
        WorkflowCommand::GateDecision {
            checkpoint_id,
            action,
        } => {
            let Some(mut open_cp) = state.registry.remove(&checkpoint_id) else {
                let err = GateError::UnknownCheckpoint {
                    id: checkpoint_id.clone(),
                };
                state
                    .events
                    .emit(WorkflowEvent::RiskRaised {
                        risk: Risk::warning("", err.to_string()),
                    })
                    .await;
                return;
            };
            let phase = open_cp.checkpoint.phase_id.clone();
            if open_cp.checkpoint.scope == CheckpointScope::Phase && action == GateAction::Retry {
                // Resuming needs a free track; the release pass delivers
                // the decision as soon as one opens.
                state.resume_queue.push_back(open_cp);
                return;
            }
            match open_cp.resolve(action) {
                Ok(()) => {
                    state
                        .events
                        .emit(WorkflowEvent::CheckpointResolved {
                            checkpoint_id,
                            phase,
                            action,
                        })
                        .await;
                }
                Err(GateError::InvalidAction { action, scope }) => {
                    // Keep the checkpoint pending for a legal decision.
                    state.registry.insert(checkpoint_id, open_cp);
                    state
                        .events
                        .emit(WorkflowEvent::RiskRaised {
                            risk: Risk::warning(
                                &phase,
                                format!("ignored {} decision for {} checkpoint", action, scope),
                            ),
                        })
                        .await;
                }
                Err(e) => {
                    state
                        .events
                        .emit(WorkflowEvent::RiskRaised {
                            risk: Risk::warning(&phase, e.to_string()),
                        })
                        .await;
                }
            }
        }
        WorkflowCommand::PublishContract {
            producer,
            entanglement,
        } => {
            let name = entanglement.name.clone();
            let report = {
                let mut plan = state.plan.lock().await;
                plan.publish_contract(&producer, entanglement);
                plan.reconcile_contracts()
            };
            state
                .events
                .emit(WorkflowEvent::ContractPublished { producer, name })
                .await;
            state
                .events
                .emit(WorkflowEvent::ContractReconciled {
                    report: Box::new(report),
                })
                .await;
        }
        WorkflowCommand::RequireContract { consumer, name } => {
            let report = {
                let mut plan = state.plan.lock().await;
                plan.require_contract(&consumer, &name);
                plan.reconcile_contracts()
            };
            state
                .events
                .emit(WorkflowEvent::ContractReconciled {
                    report: Box::new(report),
                })
                .await;
        }
        WorkflowCommand::PostDiscovery { discovery } => {
            post_discovery(state, discovery).await;
        }
        WorkflowCommand::Hail { hail } => {
            post_discovery(state, hail.discovery.clone()).await;
            match state.hails.as_ref() {
                Some(tx) => {
                    // Listener gone means the hail degrades to
                    // fire-and-forget; the reply sender drops with it.
                    tx.send(hail).await.ok();
                }
                None => drop(hail),
            }
        }
        WorkflowCommand::Cancel => {
            state.cancel.cancel();
        }
    }
}

async fn post_discovery(state: &mut RunState, discovery: Discovery) {
    state.board.post(discovery.clone());
    state
        .events
        .emit(WorkflowEvent::DiscoveryPosted {
            discovery: discovery.clone(),
        })
        .await;
    if matches!(
        discovery.kind,
        DiscoveryKind::BudgetAlert | DiscoveryKind::MissingDependency
    ) {
        let risk = Risk::warning(&discovery.phase_id, discovery.detail.clone());
        {
            let mut plan = state.plan.lock().await;
            plan.push_risk(risk.clone());
        }
        state.events.emit(WorkflowEvent::RiskRaised { risk }).await;
    }
}
