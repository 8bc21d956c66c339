//! Dependency graph construction and cycle detection.
//!
//! The graph is a plain adjacency map over phase ids with DFS
//! reachability, so cycle checks are testable independently of the
//! scheduler. Hot-add validation reuses the same reachability search
//! against the live dependency snapshot.

use crate::errors::GraphError;
use crate::phase::{Phase, Risk};
use std::collections::{HashMap, HashSet};

/// A directed dependency graph: phase id -> ids it depends on.
///
/// Edges point from a phase to its dependencies, so "reachable from X"
/// means "X transitively depends on". Dependency ids that do not resolve
/// to a known phase simply have no outgoing edges; they are surfaced as
/// warning risks by [`GraphBuilder`], never treated as cycles.
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DepGraph {
    /// Build the graph from the live `depends_on` snapshot of a phase set.
    pub fn from_phases(phases: &[Phase]) -> Self {
        let edges = phases
            .iter()
            .map(|p| (p.id.clone(), p.depends_on.clone()))
            .collect();
        Self { edges }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Check if a phase id is a node in this graph.
    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// All ids transitively reachable from `start` by following
    /// dependency edges forward. `start` itself is not included unless it
    /// participates in a cycle.
    pub fn reachable_from(&self, start: &str) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<&str> = vec![start];
        while let Some(node) = stack.pop() {
            let Some(deps) = self.edges.get(node) else {
                continue;
            };
            for dep in deps {
                if seen.insert(dep.clone()) {
                    stack.push(dep);
                }
            }
        }
        seen
    }

    /// Check whether adding the edge set `new_id -> new_deps` on top of
    /// the existing edges would create a cycle.
    ///
    /// Returns true for the trivial self-dependency (`new_id` listed in
    /// `new_deps`) and whenever any proposed dependency can already reach
    /// `new_id` through existing edges.
    pub fn would_create_cycle(&self, new_id: &str, new_deps: &[String]) -> bool {
        for dep in new_deps {
            if dep == new_id {
                return true;
            }
            if self.reachable_from(dep).contains(new_id) {
                return true;
            }
        }
        false
    }
}

/// Builder validating a phase set into a [`DepGraph`] plus config risks.
pub struct GraphBuilder<'a> {
    phases: &'a [Phase],
}

/// A validated graph with the risks discovered during validation.
#[derive(Debug)]
pub struct ValidatedGraph {
    pub graph: DepGraph,
    pub risks: Vec<Risk>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(phases: &'a [Phase]) -> Self {
        Self { phases }
    }

    /// Validate the phase set.
    ///
    /// Duplicate ids are a hard error. Dependency ids that resolve to no
    /// known phase are a configuration smell surfaced as warning risks;
    /// leveling ignores them. Cycle rejection happens during wave
    /// computation, which names the unresolvable phases.
    pub fn build(self) -> Result<ValidatedGraph, GraphError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for phase in self.phases {
            if !seen.insert(phase.id.as_str()) {
                return Err(GraphError::DuplicatePhase {
                    id: phase.id.clone(),
                });
            }
        }

        let mut risks = Vec::new();
        for phase in self.phases {
            for dep in &phase.depends_on {
                if !seen.contains(dep.as_str()) {
                    risks.push(Risk::warning(
                        &phase.id,
                        format!("depends on unknown phase '{}'", dep),
                    ));
                }
            }
        }

        Ok(ValidatedGraph {
            graph: DepGraph::from_phases(self.phases),
            risks,
        })
    }
}
