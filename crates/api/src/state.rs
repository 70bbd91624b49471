use std::sync::Arc;

use groupexec_comfyui::bridge::EngineBridge;
use groupexec_pipeline::orchestrator::Orchestrator;

use crate::config::ServerConfig;
use crate::presets::PresetStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Owns the task registry and the per-task workers.
    pub orchestrator: Arc<Orchestrator>,
    pub presets: Arc<PresetStore>,
    /// Live engine connection; `None` when running without one (tests).
    pub bridge: Option<Arc<EngineBridge>>,
}
