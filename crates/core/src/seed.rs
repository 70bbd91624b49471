//! Seed randomization for repeated submissions.
//!
//! Re-submitting the same sub-graph would hit the engine's cache and
//! produce identical output, so every iteration draws fresh values for
//! the conventional seed inputs.

use rand::Rng;

use crate::graph::{InputValue, WorkGraph};

/// Input names treated as random seeds.
pub const SEED_INPUT_NAMES: [&str; 2] = ["seed", "noise_seed"];

/// Whether an input name is one of [`SEED_INPUT_NAMES`].
pub fn is_seed_input(name: &str) -> bool {
    SEED_INPUT_NAMES.contains(&name)
}

/// Copy of `graph` with every seed input replaced by a fresh `u64`.
///
/// Uses the thread-local generator.
pub fn randomize_seeds(graph: &WorkGraph) -> WorkGraph {
    randomize_seeds_with(graph, &mut rand::rng())
}

/// Same as [`randomize_seeds`] with an explicit generator.
pub fn randomize_seeds_with<R: Rng + ?Sized>(graph: &WorkGraph, rng: &mut R) -> WorkGraph {
    let mut out = graph.clone();
    for (_, node) in out.iter_mut() {
        for (name, value) in node.inputs.iter_mut() {
            if is_seed_input(name) {
                *value = InputValue::Literal(serde_json::Value::from(rng.random::<u64>()));
            }
        }
    }
    out
}
