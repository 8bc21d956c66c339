//! Discoveries, hails, and the bead hierarchy.
//!
//! A discovery is a finding posted by a running phase: fire-and-forget,
//! consumed by whatever is listening. A hail escalates a discovery to
//! require a synchronous human response over an optional one-shot reply
//! channel. Beads track granular sub-issues found during a phase's review
//! cycles; they are purely observational and never feed back into
//! execution control.

use crate::agent::CycleIssue;
use crate::phase::{Risk, RiskSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// What kind of finding a phase posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryKind {
    FileConflict,
    RequirementsAmbiguity,
    BudgetAlert,
    MissingDependency,
    Other,
}

/// A finding posted by a running phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    pub phase_id: String,
    pub kind: DiscoveryKind,
    pub detail: String,
    pub posted_at: DateTime<Utc>,
}

impl Discovery {
    pub fn new(phase_id: &str, kind: DiscoveryKind, detail: &str) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            kind,
            detail: detail.to_string(),
            posted_at: Utc::now(),
        }
    }
}

/// A discovery escalated to require a synchronous human response.
///
/// When no reply channel is attached the hail is fire-and-forget.
#[derive(Debug)]
pub struct Hail {
    pub discovery: Discovery,
    reply: Option<oneshot::Sender<String>>,
}

impl Hail {
    pub fn fire_and_forget(discovery: Discovery) -> Self {
        Self {
            discovery,
            reply: None,
        }
    }

    /// Create a hail expecting a free-text reply; the caller keeps the
    /// receiving half.
    pub fn expecting_reply(discovery: Discovery) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                discovery,
                reply: Some(tx),
            },
            rx,
        )
    }

    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Deliver the response. Returns false when no reply was expected or
    /// the asking phase is gone.
    pub fn respond(self, text: &str) -> bool {
        match self.reply {
            Some(tx) => tx.send(text.to_string()).is_ok(),
            None => false,
        }
    }
}

/// Collects the discoveries posted during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryBoard {
    discoveries: Vec<Discovery>,
}

impl DiscoveryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, discovery: Discovery) {
        self.discoveries.push(discovery);
    }

    pub fn discoveries(&self) -> &[Discovery] {
        &self.discoveries
    }

    /// Discoveries severe enough to surface as plan risks: budget alerts
    /// and missing dependencies.
    pub fn risks(&self) -> Vec<Risk> {
        self.discoveries
            .iter()
            .filter_map(|d| match d.kind {
                DiscoveryKind::BudgetAlert | DiscoveryKind::MissingDependency => Some(Risk::new(
                    RiskSeverity::Warning,
                    &d.phase_id,
                    d.detail.clone(),
                )),
                _ => None,
            })
            .collect()
    }
}

/// Status of one bead in a phase's review hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    #[default]
    Open,
    InProgress,
    Closed,
}

/// A tracked issue node in a phase's review hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bead {
    pub title: String,
    pub status: BeadStatus,
    pub severity: RiskSeverity,
    /// Retry cycle in which the issue was first reported.
    pub cycle: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Bead>,
}

impl Bead {
    pub fn new(title: &str, severity: RiskSeverity, cycle: u32) -> Self {
        Self {
            title: title.to_string(),
            status: BeadStatus::Open,
            severity,
            cycle,
            children: Vec::new(),
        }
    }
}

/// Root task with the sub-issues reviewers found cycle by cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeadTree {
    pub root: Bead,
}

impl BeadTree {
    pub fn for_phase(phase_id: &str) -> Self {
        Self {
            root: Bead::new(phase_id, RiskSeverity::Info, 0),
        }
    }

    /// Fold one cycle's reviewer issues into the tree: issues not seen
    /// before open new beads; previously open beads the reviewer no
    /// longer reports are closed.
    pub fn record_cycle(&mut self, cycle: u32, issues: &[CycleIssue]) {
        for child in &mut self.root.children {
            if child.status != BeadStatus::Closed
                && !issues.iter().any(|i| i.summary == child.title)
            {
                child.status = BeadStatus::Closed;
            }
        }
        for issue in issues {
            match self
                .root
                .children
                .iter_mut()
                .find(|b| b.title == issue.summary)
            {
                Some(bead) => bead.status = BeadStatus::InProgress,
                None => self
                    .root
                    .children
                    .push(Bead::new(&issue.summary, issue.severity, cycle)),
            }
        }
    }

    pub fn open_count(&self) -> usize {
        self.root
            .children
            .iter()
            .filter(|b| b.status != BeadStatus::Closed)
            .count()
    }
}
