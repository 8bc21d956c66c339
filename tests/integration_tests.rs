//! Integration tests for Conductor
//!
//! These tests run whole workflows through the public API and verify
//! that graph leveling, the cycle loop, gates, contracts, and mid-run
//! mutation work together correctly.

use async_trait::async_trait;
use conductor::workflow::WorkflowExecutor;
use conductor::{
    CheckpointScope, CycleAgent, CycleIssue, CycleOutcome, Entanglement, EntanglementKind,
    GateAction, Phase, PhaseSpec, PhaseStatus, Plan, RiskSeverity, WorkflowConfig, WorkflowEvent,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Agent whose behavior is scripted per phase id. Unscripted phases (and
/// exhausted scripts) approve immediately. Each cycle sleeps briefly so
/// tests get a window to inject commands mid-run.
struct PlaybookAgent {
    scripts: Mutex<HashMap<String, VecDeque<CycleOutcome>>>,
    delay: Duration,
}

impl PlaybookAgent {
    fn new(delay_ms: u64) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delay: Duration::from_millis(delay_ms),
        }
    }

    fn script(self, phase_id: &str, outcomes: Vec<CycleOutcome>) -> Self {
        self.scripts
            .try_lock()
            .unwrap()
            .insert(phase_id.to_string(), outcomes.into());
        self
    }
}

#[async_trait]
impl CycleAgent for PlaybookAgent {
    async fn run_cycle(&self, phase: &Phase, _cycle: u32) -> anyhow::Result<CycleOutcome> {
        tokio::time::sleep(self.delay).await;
        let mut scripts = self.scripts.lock().await;
        Ok(scripts
            .get_mut(&phase.id)
            .and_then(|s| s.pop_front())
            .unwrap_or_else(|| CycleOutcome::approved(0.2)))
    }
}

fn spec(id: &str, deps: Vec<&str>) -> PhaseSpec {
    PhaseSpec::new(id, id, deps.into_iter().map(String::from).collect())
}

fn revise(summary: &str) -> CycleOutcome {
    CycleOutcome::revise(vec![CycleIssue::new(summary, RiskSeverity::Warning)], 0.2)
}

/// Receive events until one matches, panicking on channel close.
async fn wait_for<F>(rx: &mut mpsc::Receiver<WorkflowEvent>, mut pred: F) -> WorkflowEvent
where
    F: FnMut(&WorkflowEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("event channel closed while waiting");
        if pred(&event) {
            return event;
        }
    }
}

// =============================================================================
// Planning: graph construction and wave leveling
// =============================================================================

mod planning {
    use super::*;
    use conductor::GraphError;

    #[test]
    fn wave_leveling_matches_dependency_depth() {
        let plan = Plan::build(
            "pipeline",
            vec![
                spec("setup", vec![]),
                spec("auth", vec!["setup"]),
                spec("lint", vec!["setup"]),
                spec("tests", vec!["auth"]),
            ],
            &WorkflowConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.phase("setup").unwrap().wave, 1);
        assert_eq!(plan.phase("auth").unwrap().wave, 2);
        assert_eq!(plan.phase("lint").unwrap().wave, 2);
        assert_eq!(plan.phase("tests").unwrap().wave, 3);
        assert_eq!(plan.stats.total_waves, 3);
    }

    #[test]
    fn dependency_cycle_fails_plan_construction() {
        let result = Plan::build(
            "cyclic",
            vec![
                spec("a", vec!["c"]),
                spec("b", vec!["a"]),
                spec("c", vec!["b"]),
            ],
            &WorkflowConfig::default(),
        );

        match result {
            Err(GraphError::CyclicGraph { phases }) => {
                assert_eq!(phases.len(), 3);
            }
            other => panic!("expected cycle rejection, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_is_a_warning_not_a_failure() {
        let plan = Plan::build(
            "typo",
            vec![spec("build", vec!["ghost"])],
            &WorkflowConfig::default(),
        )
        .unwrap();

        assert!(
            plan.risks
                .iter()
                .any(|r| r.severity == RiskSeverity::Warning && r.message.contains("ghost"))
        );
        // The unknown id never blocks release.
        assert_eq!(plan.releasable(), vec!["build"]);
    }
}

// =============================================================================
// Execution: waves, tracks, and failure isolation
// =============================================================================

mod execution {
    use super::*;

    #[tokio::test]
    async fn diamond_workflow_completes_with_events() {
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(
            WorkflowConfig::default(),
            Arc::new(PlaybookAgent::new(1)),
        )
        .with_event_channel(ev_tx);

        let report = executor
            .run(
                "diamond",
                vec![
                    spec("setup", vec![]),
                    spec("api", vec!["setup"]),
                    spec("db", vec!["setup"]),
                    spec("integration", vec!["api", "db"]),
                ],
            )
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.summary.done, 4);

        let mut waves_assigned = 0;
        let mut completed = false;
        while let Ok(event) = ev_rx.try_recv() {
            match event {
                WorkflowEvent::WaveAssigned { .. } => waves_assigned += 1,
                WorkflowEvent::WorkflowCompleted { done, failed, skipped } => {
                    assert_eq!((done, failed, skipped), (4, 0, 0));
                    completed = true;
                }
                _ => {}
            }
        }
        assert_eq!(waves_assigned, 4);
        assert!(completed);
    }

    #[tokio::test]
    async fn track_limit_bounds_simultaneous_phases() {
        /// Counts how many cycles overlap in time.
        struct GaugeAgent {
            current: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl CycleAgent for GaugeAgent {
            async fn run_cycle(&self, _phase: &Phase, _cycle: u32) -> anyhow::Result<CycleOutcome> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(CycleOutcome::approved(0.1))
            }
        }

        let agent = Arc::new(GaugeAgent {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = WorkflowConfig::default().with_tracks(2);
        let executor = WorkflowExecutor::new(config, agent.clone());

        let report = executor
            .run(
                "wide",
                (0..5).map(|i| spec(&format!("p{i}"), vec![])).collect(),
            )
            .await
            .unwrap();

        assert_eq!(report.summary.done, 5);
        assert!(agent.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn exhausted_phase_fails_without_touching_siblings() {
        // "flaky" never gets approval and runs out of cycles; "steady"
        // completes; flaky's dependent is stranded Waiting.
        let agent = PlaybookAgent::new(1).script(
            "flaky",
            (0..5).map(|_| revise("still failing")).collect(),
        );
        let config = WorkflowConfig::default().with_default_max_cycles(3);
        let executor = WorkflowExecutor::new(config, Arc::new(agent));

        let report = executor
            .run(
                "isolated",
                vec![
                    spec("flaky", vec![]),
                    spec("steady", vec![]),
                    spec("downstream", vec!["flaky"]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.done, 1);
        let flaky = &report.summary.outcomes["flaky"];
        assert_eq!(flaky.status, PhaseStatus::Failed);
        assert_eq!(flaky.cycles, 4);
        assert!(flaky.error.as_deref().unwrap().contains("max cycles"));
        assert_eq!(
            report.plan.phase("downstream").unwrap().status,
            PhaseStatus::Waiting
        );
    }

    #[tokio::test]
    async fn independent_workflows_run_side_by_side() {
        let runs = (0..3).map(|i| {
            let executor = WorkflowExecutor::new(
                WorkflowConfig::default(),
                Arc::new(PlaybookAgent::new(5)),
            );
            let name = format!("run-{i}");
            async move {
                executor
                    .run(&name, vec![spec("a", vec![]), spec("b", vec!["a"])])
                    .await
            }
        });

        for report in futures::future::join_all(runs).await {
            assert!(report.unwrap().success);
        }
    }
}

// =============================================================================
// Gates: checkpoints, decisions, cancellation
// =============================================================================

mod gates {
    use super::*;

    fn gated_specs() -> Vec<PhaseSpec> {
        vec![spec("risky", vec![]), spec("steady", vec![])]
    }

    #[tokio::test]
    async fn gated_phase_suspends_without_blocking_siblings() {
        let agent = PlaybookAgent::new(5)
            .script("risky", vec![CycleOutcome::escalate(vec![], 0.2)])
            .script("steady", vec![revise("polish"), CycleOutcome::approved(0.2)]);
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("gated", gated_specs()).await });

        let opened = wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CheckpointOpened { checkpoint } if checkpoint.phase_id == "risky")
        })
        .await;
        let WorkflowEvent::CheckpointOpened { checkpoint } = opened else {
            unreachable!()
        };
        assert_eq!(checkpoint.scope, CheckpointScope::Phase);

        // The sibling finishes while risky is suspended at its gate.
        wait_for(&mut ev_rx, |e| {
            matches!(
                e,
                WorkflowEvent::StatusChanged { phase, status: PhaseStatus::Done }
                    if phase == "steady"
            )
        })
        .await;

        handle
            .gate_decision(&checkpoint.id, GateAction::Retry)
            .await
            .unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.summary.outcomes["risky"].cycles, 2);
    }

    #[tokio::test]
    async fn gated_phase_gives_its_track_back_under_a_limit_of_one() {
        let agent = PlaybookAgent::new(5).script(
            "risky",
            vec![CycleOutcome::escalate(vec![], 0.2), CycleOutcome::approved(0.2)],
        );
        let config = WorkflowConfig::default().with_tracks(1);
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor =
            WorkflowExecutor::new(config, Arc::new(agent)).with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("narrow", gated_specs()).await });

        let WorkflowEvent::CheckpointOpened { checkpoint } = wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CheckpointOpened { checkpoint } if checkpoint.phase_id == "risky")
        })
        .await
        else {
            unreachable!()
        };

        // With a single track the suspended phase must free its slot:
        // the sibling completes before any decision arrives.
        wait_for(&mut ev_rx, |e| {
            matches!(
                e,
                WorkflowEvent::StatusChanged { phase, status: PhaseStatus::Done }
                    if phase == "steady"
            )
        })
        .await;

        handle
            .gate_decision(&checkpoint.id, GateAction::Retry)
            .await
            .unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.summary.done, 2);
        assert_eq!(report.summary.outcomes["risky"].cycles, 2);
    }

    #[tokio::test]
    async fn decision_sent_on_the_opened_event_is_never_lost() {
        // Every phase escalates once; each checkpoint is accepted the
        // instant it is announced, so an announcement that outruns the
        // checkpoint registry would strand its phase forever.
        let mut agent = PlaybookAgent::new(1);
        for i in 0..6 {
            agent = agent.script(&format!("p{i}"), vec![CycleOutcome::escalate(vec![], 0.1)]);
        }
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move {
            executor
                .run(
                    "reactive",
                    (0..6).map(|i| spec(&format!("p{i}"), vec![])).collect(),
                )
                .await
        });

        let mut resolved = 0;
        while resolved < 6 {
            let WorkflowEvent::CheckpointOpened { checkpoint } = wait_for(&mut ev_rx, |e| {
                matches!(e, WorkflowEvent::CheckpointOpened { .. })
            })
            .await
            else {
                unreachable!()
            };
            handle
                .gate_decision(&checkpoint.id, GateAction::Accept)
                .await
                .unwrap();
            resolved += 1;
        }

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.summary.done, 6);
    }

    #[tokio::test]
    async fn reject_decision_fails_the_gated_phase() {
        let agent =
            PlaybookAgent::new(1).script("risky", vec![CycleOutcome::escalate(vec![], 0.2)]);
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("rejected", gated_specs()).await });

        let WorkflowEvent::CheckpointOpened { checkpoint } = wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CheckpointOpened { .. })
        })
        .await
        else {
            unreachable!()
        };
        handle
            .gate_decision(&checkpoint.id, GateAction::Reject)
            .await
            .unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.summary.failed, 1);
        let risky = &report.summary.outcomes["risky"];
        assert_eq!(risky.status, PhaseStatus::Failed);
        assert!(risky.error.as_deref().unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn cancellation_during_gate_is_never_misread_as_a_decision() {
        let agent =
            PlaybookAgent::new(1).script("risky", vec![CycleOutcome::escalate(vec![], 0.2)]);
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("canceled", gated_specs()).await });

        wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CheckpointOpened { .. })
        })
        .await;
        handle.cancel().await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.summary.canceled);
        assert!(!report.success);
        let risky = &report.summary.outcomes["risky"];
        // The phase stays at its gate; cancellation is an error path, not
        // an Accept/Reject/Retry/Skip.
        assert_eq!(risky.status, PhaseStatus::Gate);
        assert!(risky.error.as_deref().unwrap().contains("canceled"));
    }

    #[tokio::test]
    async fn acceptance_gate_holds_wave_one_until_accepted() {
        let config = WorkflowConfig::default().with_acceptance_gate(true);
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(config, Arc::new(PlaybookAgent::new(1)))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move {
            executor
                .run("gated-start", vec![spec("a", vec![]), spec("b", vec!["a"])])
                .await
        });

        let WorkflowEvent::CheckpointOpened { checkpoint } = wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CheckpointOpened { .. })
        })
        .await
        else {
            unreachable!()
        };
        assert_eq!(checkpoint.scope, CheckpointScope::Workflow);

        handle
            .gate_decision(&checkpoint.id, GateAction::Accept)
            .await
            .unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.summary.done, 2);
    }

    #[tokio::test]
    async fn acceptance_gate_skip_skips_every_phase() {
        let config = WorkflowConfig::default().with_acceptance_gate(true);
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(config, Arc::new(PlaybookAgent::new(1)))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move {
            executor
                .run("declined", vec![spec("a", vec![]), spec("b", vec!["a"])])
                .await
        });

        let WorkflowEvent::CheckpointOpened { checkpoint } = wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CheckpointOpened { .. })
        })
        .await
        else {
            unreachable!()
        };
        handle
            .gate_decision(&checkpoint.id, GateAction::Skip)
            .await
            .unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.done, 0);
    }
}

// =============================================================================
// Contracts: publication, requirements, wave-order reconciliation
// =============================================================================

mod contracts {
    use super::*;

    #[tokio::test]
    async fn earlier_wave_contract_is_fulfilled() {
        let executor = WorkflowExecutor::new(
            WorkflowConfig::default(),
            Arc::new(PlaybookAgent::new(20)),
        );
        let handle = executor.handle();

        let run = tokio::spawn(async move {
            executor
                .run(
                    "token",
                    vec![spec("auth", vec![]), spec("api", vec!["auth"])],
                )
                .await
        });

        handle
            .publish_contract(
                "auth",
                Entanglement::new(
                    "auth",
                    EntanglementKind::Interface,
                    "TokenService",
                    "issue(claims) -> Token",
                ),
            )
            .await
            .unwrap();
        handle.require_contract("api", "TokenService").await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.plan.report.fulfilled.len(), 1);
        assert_eq!(report.plan.report.fulfilled[0].producer, "auth");
        assert!(report.plan.report.is_clean());
    }

    #[tokio::test]
    async fn unsatisfied_requirement_surfaces_as_error_risk() {
        let executor = WorkflowExecutor::new(
            WorkflowConfig::default(),
            Arc::new(PlaybookAgent::new(20)),
        );
        let handle = executor.handle();

        let run = tokio::spawn(async move {
            executor.run("ghostly", vec![spec("api", vec![])]).await
        });

        handle.require_contract("api", "GhostApi").await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.plan.report.missing.len(), 1);
        assert!(
            report
                .plan
                .risks
                .iter()
                .any(|r| r.severity == RiskSeverity::Error && r.message.contains("GhostApi"))
        );
    }
}

// =============================================================================
// Hot mutation: adding and editing phases mid-run
// =============================================================================

mod hot_mutation {
    use super::*;

    #[tokio::test]
    async fn hot_added_phase_joins_and_completes() {
        // "a" needs three cycles, leaving a window to add a dependent.
        let agent = PlaybookAgent::new(20).script(
            "a",
            vec![revise("wip"), revise("wip"), CycleOutcome::approved(0.2)],
        );
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("growing", vec![spec("a", vec![])]).await });

        wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CycleCompleted { phase, .. } if phase == "a")
        })
        .await;
        handle.hot_add(spec("late", vec!["a"])).await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        assert_eq!(report.summary.done, 2);
        let late = report.plan.phase("late").unwrap();
        assert_eq!(late.status, PhaseStatus::Done);
        // Wave 1 already started, so the new phase lands later.
        assert!(late.wave >= 2);
    }

    #[tokio::test]
    async fn duplicate_hot_add_raises_error_risk() {
        let agent = PlaybookAgent::new(20).script(
            "a",
            vec![revise("wip"), CycleOutcome::approved(0.2)],
        );
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("dup", vec![spec("a", vec![])]).await });

        handle.hot_add(spec("a", vec![])).await.unwrap();
        let raised = wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::RiskRaised { risk } if risk.severity == RiskSeverity::Error)
        })
        .await;
        let WorkflowEvent::RiskRaised { risk } = raised else {
            unreachable!()
        };
        assert!(risk.message.contains("Duplicate"));

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.plan.phases().len(), 1);
    }

    #[tokio::test]
    async fn hot_edit_lands_at_the_next_cycle_boundary() {
        let agent = PlaybookAgent::new(20).script(
            "a",
            vec![revise("wip"), revise("wip"), CycleOutcome::approved(0.2)],
        );
        let (ev_tx, mut ev_rx) = mpsc::channel(256);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_event_channel(ev_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("edited", vec![spec("a", vec![])]).await });

        wait_for(&mut ev_rx, |e| {
            matches!(e, WorkflowEvent::CycleCompleted { phase, cycle: 1, .. } if phase == "a")
        })
        .await;
        handle.hot_edit("a", "tightened requirements").await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert!(report.success);
        let phase = report.plan.phase("a").unwrap();
        assert_eq!(phase.spec_body, "tightened requirements");
        assert!(phase.refactored);
    }
}

// =============================================================================
// Reporting
// =============================================================================

mod reporting {
    use super::*;
    use conductor::WorkflowSummary;
    use std::fs::File;

    #[tokio::test]
    async fn summary_round_trips_through_a_json_file() {
        let executor = WorkflowExecutor::new(
            WorkflowConfig::default(),
            Arc::new(PlaybookAgent::new(1)),
        );
        let report = executor
            .run("persisted", vec![spec("a", vec![]), spec("b", vec!["a"])])
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        serde_json::to_writer_pretty(File::create(&path).unwrap(), &report.summary).unwrap();

        let loaded: WorkflowSummary =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(loaded.done, 2);
        assert_eq!(loaded.total_phases, report.summary.total_phases);
        assert!(loaded.outcomes.contains_key("a"));
    }

    #[tokio::test]
    async fn posted_discoveries_land_on_the_report() {
        use conductor::{Discovery, DiscoveryKind};

        let agent = PlaybookAgent::new(20).script(
            "a",
            vec![revise("wip"), CycleOutcome::approved(0.2)],
        );
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent));
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("noted", vec![spec("a", vec![])]).await });

        handle
            .post_discovery(Discovery::new("a", DiscoveryKind::BudgetAlert, "80% spent"))
            .await
            .unwrap();
        handle
            .post_discovery(Discovery::new("a", DiscoveryKind::Other, "note"))
            .await
            .unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.discoveries.discoveries().len(), 2);
        // Budget alerts escalate to plan risks; plain notes do not.
        assert!(
            report
                .plan
                .risks
                .iter()
                .any(|r| r.severity == RiskSeverity::Warning && r.message.contains("80%"))
        );
    }

    #[tokio::test]
    async fn hail_reaches_the_listener_and_the_reply_comes_back() {
        use conductor::{Discovery, DiscoveryKind};

        let agent = PlaybookAgent::new(30).script(
            "a",
            vec![revise("wip"), CycleOutcome::approved(0.2)],
        );
        let (hail_tx, mut hail_rx) = mpsc::channel(8);
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent))
            .with_hail_channel(hail_tx);
        let handle = executor.handle();

        let run = tokio::spawn(async move { executor.run("hailed", vec![spec("a", vec![])]).await });

        let reply_rx = handle
            .hail(Discovery::new(
                "a",
                DiscoveryKind::RequirementsAmbiguity,
                "which hash?",
            ))
            .await
            .unwrap();

        let hail = hail_rx.recv().await.unwrap();
        assert!(hail.expects_reply());
        assert_eq!(hail.discovery.detail, "which hash?");
        assert!(hail.respond("argon2id"));
        assert_eq!(reply_rx.await.unwrap(), "argon2id");

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.discoveries.discoveries().len(), 1);
    }

    #[tokio::test]
    async fn hail_without_a_listener_degrades_to_fire_and_forget() {
        use conductor::{Discovery, DiscoveryKind};

        let agent = PlaybookAgent::new(30).script(
            "a",
            vec![revise("wip"), CycleOutcome::approved(0.2)],
        );
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent));
        let handle = executor.handle();

        let run =
            tokio::spawn(async move { executor.run("unheard", vec![spec("a", vec![])]).await });

        let reply_rx = handle
            .hail(Discovery::new("a", DiscoveryKind::Other, "anyone there?"))
            .await
            .unwrap();

        // Nobody listens; the reply channel closes without an answer but
        // the underlying discovery still lands on the board.
        assert!(reply_rx.await.is_err());

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.discoveries.discoveries().len(), 1);
    }

    #[tokio::test]
    async fn summary_accounts_for_total_spend() {
        let agent = PlaybookAgent::new(1).script(
            "a",
            vec![revise("wip"), CycleOutcome::approved(0.2)],
        );
        let executor = WorkflowExecutor::new(WorkflowConfig::default(), Arc::new(agent));
        let report = executor
            .run("costed", vec![spec("a", vec![]), spec("b", vec![])])
            .await
            .unwrap();

        // a: two cycles at 0.2; b: one cycle at 0.2.
        assert!((report.summary.total_cost_usd - 0.6).abs() < 1e-9);
    }
}
