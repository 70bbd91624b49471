//! Group execution orchestration.
//!
//! Drives an [`ExecutionPlan`](groupexec_core::plan::ExecutionPlan)
//! against the engine one group iteration at a time:
//!
//! - [`gateway`]: the [`EngineGateway`](gateway::EngineGateway) seam and
//!   its ComfyUI-backed implementation.
//! - [`interrupts`]: the set of externally interrupted requests and the
//!   watcher that fills it from the engine event stream.
//! - [`registry`]: per-task state, cancellation tokens and worker handles.
//! - [`orchestrator`]: start / cancel / status and the worker loop.

pub mod config;
pub mod error;
pub mod gateway;
pub mod interrupts;
pub mod orchestrator;
pub mod registry;
