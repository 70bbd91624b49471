//! Pure domain logic for the group executor.
//!
//! Holds the work-graph model, dependency closure, seed randomization,
//! execution plan model and preset-name rules. No I/O lives here so the
//! engine client, orchestrator and HTTP layer can all share it.

pub mod error;
pub mod graph;
pub mod plan;
pub mod preset;
pub mod seed;
pub mod types;
