//! The validated, wave-partitioned plan for one workflow run.
//!
//! A [`Plan`] owns all workflow state: the phases, their wave assignment,
//! the contract ledger with its latest reconciliation report, and the
//! accumulated risk entries. It is created once per run from the validated
//! graph and then mutated under the executor's lock; there are no
//! process-wide singletons. Report and risks are recomputed from the full
//! current set whenever the ledger or phase set changes.

use crate::config::WorkflowConfig;
use crate::errors::{GraphError, WorkflowError};
use crate::graph::{DepGraph, GraphBuilder, WavePlan, compute_waves};
use crate::ledger::{ContractLedger, ContractReport, Entanglement};
use crate::phase::{Phase, PhaseSpec, PhaseStatus, Risk};
use serde::{Deserialize, Serialize};

/// Aggregate plan statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStats {
    pub total_phases: usize,
    pub total_waves: usize,
    /// Maximum simultaneous Working phases: the widest wave capped by the
    /// configured track limit.
    pub total_tracks: usize,
    /// Sum of per-phase budget ceilings.
    pub estimated_cost: f64,
}

/// One workflow's worth of phases, waves, contracts, and risks.
#[derive(Debug, Clone)]
pub struct Plan {
    pub name: String,
    phases: Vec<Phase>,
    wave_plan: WavePlan,
    pub ledger: ContractLedger,
    pub report: ContractReport,
    /// Combined view: standing (graph/discovery) risks plus the latest
    /// contract reconciliation risks.
    pub risks: Vec<Risk>,
    pub stats: PlanStats,
    standing_risks: Vec<Risk>,
    budget_per_phase: f64,
}

impl Plan {
    /// Build a plan from phase specs: validate the graph, level waves,
    /// and assign each phase its wave.
    pub fn build(
        name: &str,
        specs: Vec<PhaseSpec>,
        config: &WorkflowConfig,
    ) -> Result<Self, GraphError> {
        let mut phases: Vec<Phase> = specs
            .into_iter()
            .map(|spec| Phase::from_spec(spec, config.default_max_cycles))
            .collect();

        let validated = GraphBuilder::new(&phases).build()?;
        let wave_plan = compute_waves(&phases)?;
        for phase in &mut phases {
            // Leveling covered every phase or compute_waves would have
            // failed; 0 is unreachable here.
            phase.wave = wave_plan.wave_of(&phase.id).unwrap_or(0);
        }

        let stats = PlanStats {
            total_phases: phases.len(),
            total_waves: wave_plan.total_waves(),
            total_tracks: wave_plan.max_width().min(config.tracks),
            estimated_cost: phases.len() as f64 * config.phase_budget_usd,
        };

        let mut plan = Self {
            name: name.to_string(),
            phases,
            wave_plan,
            ledger: ContractLedger::new(),
            report: ContractReport::default(),
            risks: Vec::new(),
            stats,
            standing_risks: validated.risks,
            budget_per_phase: config.phase_budget_usd,
        };
        plan.rebuild_risks();
        Ok(plan)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn wave_plan(&self) -> &WavePlan {
        &self.wave_plan
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn phase_mut(&mut self, id: &str) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.id == id)
    }

    pub fn set_status(&mut self, id: &str, status: PhaseStatus) {
        if let Some(phase) = self.phase_mut(id) {
            phase.status = status;
        }
    }

    /// Check if every dependency of a phase has released its dependents
    /// (Done or Skipped). Unknown dependency ids never block release;
    /// they were already surfaced as warning risks.
    pub fn deps_released(&self, id: &str) -> bool {
        let Some(phase) = self.phase(id) else {
            return false;
        };
        phase.depends_on.iter().all(|dep| {
            self.phase(dep)
                .is_none_or(|d| d.status.releases_dependents())
        })
    }

    /// Waiting phases whose dependencies are all released, in plan order.
    pub fn releasable(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Waiting && self.deps_released(&p.id))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Check if every phase reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.phases.iter().all(|p| p.status.is_terminal())
    }

    /// (done, failed, skipped) tallies.
    pub fn outcome_counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for phase in &self.phases {
            match phase.status {
                PhaseStatus::Done => counts.0 += 1,
                PhaseStatus::Failed => counts.1 += 1,
                PhaseStatus::Skipped => counts.2 += 1,
                _ => {}
            }
        }
        counts
    }

    /// Record a standing risk (graph or discovery escalation) and refresh
    /// the combined view.
    pub fn push_risk(&mut self, risk: Risk) {
        self.standing_risks.push(risk);
        self.rebuild_risks();
    }

    /// Publish a contract into the ledger. The caller re-reconciles.
    pub fn publish_contract(&mut self, producer: &str, entanglement: Entanglement) {
        self.ledger.publish(producer, entanglement);
    }

    /// Declare a contract requirement. The caller re-reconciles.
    pub fn require_contract(&mut self, consumer: &str, name: &str) {
        self.ledger.require(consumer, name);
    }

    /// Reconcile the ledger against the current wave assignment and
    /// refresh the report and risk views.
    pub fn reconcile_contracts(&mut self) -> ContractReport {
        let report = self.ledger.reconcile(&self.wave_plan);
        self.report = report.clone();
        self.rebuild_risks();
        report
    }

    fn rebuild_risks(&mut self) {
        let mut risks = self.standing_risks.clone();
        risks.extend(self.report.risks());
        self.risks = risks;
    }

    /// Hot-add a phase to the running workflow.
    ///
    /// Validates the new edges against the live dependency snapshot
    /// (including Done phases). The accepted phase levels at
    /// `1 + max(dep waves)` but never earlier than `wave_floor`, the
    /// first wave that has not started executing; waves that began are
    /// frozen. Returns the assigned wave.
    pub fn hot_add(
        &mut self,
        spec: PhaseSpec,
        default_max_cycles: u32,
        wave_floor: usize,
    ) -> Result<usize, WorkflowError> {
        if self.phase(&spec.id).is_some() {
            return Err(GraphError::DuplicatePhase { id: spec.id }.into());
        }

        let snapshot = DepGraph::from_phases(&self.phases);
        if snapshot.would_create_cycle(&spec.id, &spec.depends_on) {
            return Err(WorkflowError::WouldCycle { id: spec.id });
        }

        for dep in &spec.depends_on {
            if self.phase(dep).is_none() {
                self.standing_risks.push(Risk::warning(
                    &spec.id,
                    format!("depends on unknown phase '{}'", dep),
                ));
            }
        }

        let wave = self.wave_plan.level_for(&spec.depends_on).max(wave_floor);
        let mut phase = Phase::from_spec(spec, default_max_cycles);
        phase.wave = wave;
        self.wave_plan.insert(&phase.id, wave);
        self.phases.push(phase);

        self.stats.total_phases = self.phases.len();
        self.stats.total_waves = self.wave_plan.total_waves();
        self.stats.estimated_cost = self.phases.len() as f64 * self.budget_per_phase;
        self.rebuild_risks();
        Ok(wave)
    }

    /// Hot-edit a phase's spec body. Edits to a Working or gated phase
    /// are queued and applied at the next cycle boundary; a phase that
    /// has not started gets the edit immediately. Returns true when the
    /// edit was queued rather than applied.
    pub fn hot_edit(&mut self, id: &str, new_body: &str) -> Result<bool, WorkflowError> {
        let Some(phase) = self.phase_mut(id) else {
            return Err(WorkflowError::UnknownPhase { id: id.to_string() });
        };
        match phase.status {
            PhaseStatus::Working | PhaseStatus::Gate => {
                phase.queue_edit(new_body.to_string());
                Ok(true)
            }
            _ => {
                phase.spec_body = new_body.to_string();
                phase.refactored = true;
                Ok(false)
            }
        }
    }

    /// Total spend across all phases.
    pub fn total_cost(&self) -> f64 {
        self.phases.iter().map(|p| p.cost_usd).sum()
    }
}
