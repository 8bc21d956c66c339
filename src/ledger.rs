//! Contract ledger: cross-phase interface declarations and reconciliation.
//!
//! Phases publish named interface contracts ("entanglements") they will
//! produce and declare requirements on names later phases consume.
//! Reconciliation matches the two sets against the wave assignment so
//! that a consumer can never be scheduled before its producer: a producer
//! in the same or a later wave than its consumer is a conflict, not a
//! fulfillment. Reconciliation always recomputes from the full current
//! set, so it is idempotent and safe to re-run after every publication or
//! hot-add.

use crate::graph::WavePlan;
use crate::phase::{Risk, RiskSeverity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Consumer wildcard: the contract may be consumed by any phase.
pub const ANY_CONSUMER: &str = "*";

/// What kind of interface an entanglement describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntanglementKind {
    Function,
    Type,
    #[default]
    Interface,
    Schema,
    Endpoint,
}

/// Reconciliation status of an entanglement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntanglementStatus {
    /// Published, no matching requirement reconciled yet.
    #[default]
    Pending,
    /// Matched by at least one wave-consistent requirement.
    Fulfilled,
    /// Involved in a duplicate-producer or wave-ordering conflict.
    Disputed,
}

/// A named interface contract published by one phase for later phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entanglement {
    pub id: String,
    /// Phase that will produce the interface.
    pub producer: String,
    /// Phase expected to consume it, or [`ANY_CONSUMER`].
    pub consumer: String,
    pub kind: EntanglementKind,
    /// Contract name; requirements match on this exactly.
    pub name: String,
    /// Free-form interface text (signature, schema, endpoint shape).
    pub signature: String,
    pub status: EntanglementStatus,
}

impl Entanglement {
    pub fn new(producer: &str, kind: EntanglementKind, name: &str, signature: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            producer: producer.to_string(),
            consumer: ANY_CONSUMER.to_string(),
            kind,
            name: name.to_string(),
            signature: signature.to_string(),
            status: EntanglementStatus::Pending,
        }
    }

    pub fn for_consumer(mut self, consumer: &str) -> Self {
        self.consumer = consumer.to_string();
        self
    }
}

/// A dependency on a named interface, declared by a consumer phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub consumer: String,
    pub name: String,
}

/// A requirement satisfied by a wave-consistent publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub name: String,
    pub producer: String,
    pub consumer: String,
}

/// A requirement with no matching publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingContract {
    pub name: String,
    pub consumer: String,
}

/// Why a contract pairing is in conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// Two phases publish the same contract name.
    DuplicateProducer { other_producer: String },
    /// The producer's wave is not strictly earlier than the consumer's,
    /// so the consumer could be scheduled before the producer exists.
    WaveOrder {
        producer_wave: usize,
        consumer_wave: usize,
    },
}

/// A conflicting contract pairing, surfaced as an error-severity risk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConflict {
    pub name: String,
    pub producer: String,
    /// Consumer involved, when the conflict stems from a requirement.
    pub consumer: Option<String>,
    #[serde(flatten)]
    pub reason: ConflictReason,
}

/// Result of reconciling publications against requirements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractReport {
    pub fulfilled: Vec<Fulfillment>,
    pub missing: Vec<MissingContract>,
    pub conflicts: Vec<ContractConflict>,
}

impl ContractReport {
    /// Risks surfaced by this report: one error per missing or
    /// conflicting contract.
    pub fn risks(&self) -> Vec<Risk> {
        let mut risks = Vec::new();
        for miss in &self.missing {
            risks.push(Risk::new(
                RiskSeverity::Error,
                &miss.consumer,
                format!("requires contract '{}' but no phase publishes it", miss.name),
            ));
        }
        for conflict in &self.conflicts {
            let message = match &conflict.reason {
                ConflictReason::DuplicateProducer { other_producer } => format!(
                    "contract '{}' published by both {} and {}",
                    conflict.name, conflict.producer, other_producer
                ),
                ConflictReason::WaveOrder {
                    producer_wave,
                    consumer_wave,
                } => format!(
                    "contract '{}' produced by {} in wave {} but consumed by {} in wave {}",
                    conflict.name,
                    conflict.producer,
                    producer_wave,
                    conflict.consumer.as_deref().unwrap_or(ANY_CONSUMER),
                    consumer_wave
                ),
            };
            risks.push(Risk::new(RiskSeverity::Error, &conflict.producer, message));
        }
        risks
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.conflicts.is_empty()
    }
}

/// The ledger of published contracts and declared requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractLedger {
    publications: Vec<Entanglement>,
    requirements: Vec<Requirement>,
}

impl ContractLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interface the producer phase will provide.
    pub fn publish(&mut self, producer: &str, mut entanglement: Entanglement) {
        entanglement.producer = producer.to_string();
        entanglement.status = EntanglementStatus::Pending;
        self.publications.push(entanglement);
    }

    /// Record a dependency of `consumer` on the named interface.
    /// Duplicate declarations are collapsed.
    pub fn require(&mut self, consumer: &str, name: &str) {
        let req = Requirement {
            consumer: consumer.to_string(),
            name: name.to_string(),
        };
        if !self.requirements.contains(&req) {
            self.requirements.push(req);
        }
    }

    pub fn publications(&self) -> &[Entanglement] {
        &self.publications
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Reconcile the full current set of publications and requirements
    /// against the wave assignment.
    ///
    /// Recomputes from scratch every time rather than patching prior
    /// results, so repeated calls without new declarations yield an
    /// identical report. Entanglement statuses are rewritten to match.
    pub fn reconcile(&mut self, plan: &WavePlan) -> ContractReport {
        let mut report = ContractReport::default();

        // Group publication indices by contract name, preserving order.
        let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, publication) in self.publications.iter().enumerate() {
            by_name.entry(publication.name.as_str()).or_default().push(i);
        }

        let mut statuses = vec![EntanglementStatus::Pending; self.publications.len()];

        // Duplicate producers conflict with each other even before any
        // requirement names them.
        for indices in by_name.values() {
            if indices.len() > 1 {
                for window in indices.windows(2) {
                    let (first, second) = (window[0], window[1]);
                    report.conflicts.push(ContractConflict {
                        name: self.publications[first].name.clone(),
                        producer: self.publications[first].producer.clone(),
                        consumer: None,
                        reason: ConflictReason::DuplicateProducer {
                            other_producer: self.publications[second].producer.clone(),
                        },
                    });
                }
                for &i in indices {
                    statuses[i] = EntanglementStatus::Disputed;
                }
            }
        }

        for requirement in &self.requirements {
            let Some(indices) = by_name.get(requirement.name.as_str()) else {
                report.missing.push(MissingContract {
                    name: requirement.name.clone(),
                    consumer: requirement.consumer.clone(),
                });
                continue;
            };

            // Ambiguous names were already flagged above; a requirement
            // only reconciles against an unambiguous publication.
            if indices.len() != 1 {
                continue;
            }
            let index = indices[0];
            let publication = &self.publications[index];

            // A publication targeted at one consumer is invisible to
            // every other phase.
            if publication.consumer != ANY_CONSUMER
                && publication.consumer != requirement.consumer
            {
                report.missing.push(MissingContract {
                    name: requirement.name.clone(),
                    consumer: requirement.consumer.clone(),
                });
                continue;
            }

            // Unleveled phases (hot-added but not yet accepted, or typo'd
            // ids) cannot prove ordering, so they classify as conflicts.
            let producer_wave = plan.wave_of(&publication.producer).unwrap_or(0);
            let consumer_wave = plan.wave_of(&requirement.consumer).unwrap_or(0);

            if producer_wave > 0 && producer_wave < consumer_wave {
                report.fulfilled.push(Fulfillment {
                    name: requirement.name.clone(),
                    producer: publication.producer.clone(),
                    consumer: requirement.consumer.clone(),
                });
                if statuses[index] == EntanglementStatus::Pending {
                    statuses[index] = EntanglementStatus::Fulfilled;
                }
            } else {
                report.conflicts.push(ContractConflict {
                    name: requirement.name.clone(),
                    producer: publication.producer.clone(),
                    consumer: Some(requirement.consumer.clone()),
                    reason: ConflictReason::WaveOrder {
                        producer_wave,
                        consumer_wave,
                    },
                });
                statuses[index] = EntanglementStatus::Disputed;
            }
        }

        for (publication, status) in self.publications.iter_mut().zip(statuses) {
            publication.status = status;
        }

        report
    }
}
