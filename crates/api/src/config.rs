use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for running next to a local
/// ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `8190`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for orchestration workers (default: `10`).
    pub shutdown_timeout_secs: u64,
    /// ComfyUI HTTP base URL.
    pub comfyui_api_url: String,
    /// ComfyUI WebSocket base URL.
    pub comfyui_ws_url: String,
    /// Directory holding saved plan presets.
    pub presets_dir: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `HOST`                  | `127.0.0.1`              |
    /// | `PORT`                  | `8190`                   |
    /// | `CORS_ORIGINS`          | `http://127.0.0.1:8188`  |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `10`                     |
    /// | `COMFYUI_API_URL`       | `http://127.0.0.1:8188`  |
    /// | `COMFYUI_WS_URL`        | `ws://127.0.0.1:8188`    |
    /// | `PRESETS_DIR`           | `./group_configs`        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8190".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://127.0.0.1:8188".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let comfyui_api_url = std::env::var("COMFYUI_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8188".into())
            .trim_end_matches('/')
            .to_string();

        let comfyui_ws_url = std::env::var("COMFYUI_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8188".into())
            .trim_end_matches('/')
            .to_string();

        let presets_dir = std::env::var("PRESETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./group_configs"));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            comfyui_api_url,
            comfyui_ws_url,
            presets_dir,
        }
    }
}
