//! Wave leveling: partitioning phases into ordered parallel waves.
//!
//! A phase's wave is `1 + max(wave of each dependency)`, or wave 1 when it
//! has no dependencies. Every phase therefore sits strictly later than all
//! of its dependencies, and phases sharing a wave carry no implied order.

use crate::errors::GraphError;
use crate::phase::Phase;
use std::collections::{HashMap, HashSet};

/// The wave partition of a phase set.
#[derive(Debug, Clone, Default)]
pub struct WavePlan {
    /// Waves in execution order; index 0 holds wave 1.
    waves: Vec<Vec<String>>,
    /// Phase id -> 1-based wave number.
    assignment: HashMap<String, usize>,
}

impl WavePlan {
    /// The 1-based wave of a phase, if leveled.
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.assignment.get(id).copied()
    }

    /// Waves in execution order. `waves()[0]` is wave 1.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Members of a 1-based wave.
    pub fn wave_members(&self, wave: usize) -> &[String] {
        match wave.checked_sub(1).and_then(|i| self.waves.get(i)) {
            Some(members) => members.as_slice(),
            None => &[],
        }
    }

    pub fn total_waves(&self) -> usize {
        self.waves.len()
    }

    /// Widest wave: the maximum legal concurrency before track capping.
    pub fn max_width(&self) -> usize {
        self.waves.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Append a hot-added phase to a wave, extending the plan as needed.
    /// Existing wave membership is never reshuffled.
    pub fn insert(&mut self, id: &str, wave: usize) {
        let wave = wave.max(1);
        while self.waves.len() < wave {
            self.waves.push(Vec::new());
        }
        self.waves[wave - 1].push(id.to_string());
        self.assignment.insert(id.to_string(), wave);
    }

    /// The wave a phase with the given dependencies would be assigned:
    /// `1 + max(dep waves)`, ignoring ids this plan has never leveled.
    pub fn level_for(&self, depends_on: &[String]) -> usize {
        depends_on
            .iter()
            .filter_map(|dep| self.assignment.get(dep))
            .max()
            .map_or(1, |max_dep| max_dep + 1)
    }
}

/// Compute the wave partition for a phase set by longest-path leveling.
///
/// Dependency ids that do not name any phase in the set are ignored here
/// (the graph builder has already surfaced them as warning risks). Fails
/// with [`GraphError::CyclicGraph`] naming the phases that could not be
/// leveled after a bounded number of passes.
pub fn compute_waves(phases: &[Phase]) -> Result<WavePlan, GraphError> {
    let known: HashSet<&str> = phases.iter().map(|p| p.id.as_str()).collect();
    let mut assignment: HashMap<String, usize> = HashMap::new();

    // Each pass levels at least one phase in an acyclic graph, so
    // phase-count passes suffice; anything left over sits on a cycle.
    for _ in 0..phases.len() {
        let mut progressed = false;
        for phase in phases {
            if assignment.contains_key(&phase.id) {
                continue;
            }
            let resolvable_deps: Vec<&String> = phase
                .depends_on
                .iter()
                .filter(|dep| known.contains(dep.as_str()))
                .collect();
            if resolvable_deps
                .iter()
                .all(|dep| assignment.contains_key(dep.as_str()))
            {
                let wave = resolvable_deps
                    .iter()
                    .filter_map(|dep| assignment.get(dep.as_str()))
                    .max()
                    .map_or(1, |max_dep| max_dep + 1);
                assignment.insert(phase.id.clone(), wave);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    if assignment.len() != phases.len() {
        let mut unresolved: Vec<String> = phases
            .iter()
            .filter(|p| !assignment.contains_key(&p.id))
            .map(|p| p.id.clone())
            .collect();
        unresolved.sort();
        return Err(GraphError::CyclicGraph { phases: unresolved });
    }

    let total = assignment.values().copied().max().unwrap_or(0);
    let mut waves: Vec<Vec<String>> = vec![Vec::new(); total];
    // Preserve input order within each wave.
    for phase in phases {
        if let Some(&wave) = assignment.get(&phase.id) {
            waves[wave - 1].push(phase.id.clone());
        }
    }

    Ok(WavePlan { waves, assignment })
}
