use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use groupexec_comfyui::bridge::{BridgeConfig, EngineBridge};
use groupexec_comfyui::reconnect::BackoffPolicy;
use groupexec_pipeline::config::OrchestratorConfig;
use groupexec_pipeline::gateway::ComfyUIGateway;
use groupexec_pipeline::orchestrator::Orchestrator;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groupexec_api::config::ServerConfig;
use groupexec_api::presets::PresetStore;
use groupexec_api::router::build_app_router;
use groupexec_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "groupexec_api=debug,groupexec_pipeline=debug,groupexec_comfyui=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let orchestrator_config = OrchestratorConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        comfyui = %config.comfyui_api_url,
        poll_interval_ms = orchestrator_config.poll_interval.as_millis() as u64,
        interrupt_policy = ?orchestrator_config.interrupt_policy,
        "Loaded configuration",
    );

    // --- Presets ---
    let presets = PresetStore::new(config.presets_dir.clone());
    presets
        .ensure_dir()
        .await
        .expect("Failed to create presets directory");

    // --- Engine bridge ---
    let bridge = EngineBridge::start(BridgeConfig {
        api_url: config.comfyui_api_url.clone(),
        ws_url: config.comfyui_ws_url.clone(),
        backoff: BackoffPolicy::default(),
    });
    tracing::info!(client_id = bridge.client_id(), "ComfyUI bridge started");

    // --- Orchestrator + interrupt watcher ---
    let gateway = Arc::new(ComfyUIGateway::from_bridge(
        &bridge,
        orchestrator_config.submit_timeout,
    ));
    let orchestrator = Arc::new(Orchestrator::new(gateway, orchestrator_config));

    let watcher_cancel = CancellationToken::new();
    let watcher_handle = orchestrator
        .watcher()
        .spawn(bridge.subscribe(), watcher_cancel.clone());

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        presets: Arc::new(presets),
        bridge: Some(Arc::clone(&bridge)),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop running tasks first: queued prompts are dequeued and the
    // executing one is interrupted.
    orchestrator
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    watcher_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), watcher_handle).await;
    tracing::info!("Interrupt watcher stopped");

    bridge.shutdown().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
