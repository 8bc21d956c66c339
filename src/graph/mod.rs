//! Dependency graph construction, cycle rejection, and wave leveling.
//!
//! This module turns a set of phase specifications into a wave-partitioned
//! execution plan:
//!
//! 1. **Builder** — validates the phase set into a reusable dependency
//!    graph (adjacency map + DFS reachability) and surfaces configuration
//!    risks such as unknown dependency ids.
//! 2. **Waves** — longest-path leveling so that every phase's wave is
//!    strictly greater than the waves of all its dependencies; phases
//!    sharing a wave may run concurrently.
//!
//! Hot-add validation re-runs the same reachability search against the
//! live dependency snapshot before a new phase is accepted.

mod builder;
mod waves;

pub use builder::{DepGraph, GraphBuilder, ValidatedGraph};
pub use waves::{WavePlan, compute_waves};
