use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::api::{self, AppState};
use super::bd::{self, BdCli};
use super::hub::BroadcastHub;
use super::snapshot::SnapshotCache;
use super::watcher::{BEADS_DIR, LogWatcher};
use super::ws;

/// Configuration for the dashboard server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workspace: PathBuf,
    pub bd_cmd: String,
    pub command_timeout: Duration,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            workspace: PathBuf::from("."),
            bd_cmd: "bd".to_string(),
            command_timeout: bd::DEFAULT_TIMEOUT,
            dev_mode: false,
        }
    }
}

/// Build the full application router: REST API plus the `/ws` push channel.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Bind to the configured address and serve until Ctrl-C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    serve(listener, config, shutdown_signal()).await
}

/// Start the watcher, serve on `listener` until `shutdown` resolves, then stop
/// the watcher.
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !config.workspace.join(BEADS_DIR).is_dir() {
        warn!(
            workspace = %config.workspace.display(),
            "No .beads directory found; run `bd init` in the workspace"
        );
    }

    let cli = BdCli::new(&config.workspace)
        .with_command(&config.bd_cmd)
        .context("Invalid bd command")?
        .with_timeout(config.command_timeout);

    let hub = BroadcastHub::new(SnapshotCache::new());
    let watcher = LogWatcher::new(&config.workspace, hub.clone());
    watcher
        .start()
        .await
        .context("Failed to start issues log watcher")?;

    let state = Arc::new(AppState::new(cli, hub));
    let app = build_router(state, config.dev_mode);

    let local_addr = listener.local_addr()?;
    info!(
        url = %format!("http://{}", local_addr),
        workspace = %config.workspace.display(),
        "Loom dashboard running"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error");

    watcher.stop().await;
    info!("Server shut down gracefully");
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
