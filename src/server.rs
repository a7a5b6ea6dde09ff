/// Server setup and initialization
///
/// Wires together all components: snapshot store, remote client, origin
/// tracker, session hub, sync engine, watch bridge, poller and HTTP routes.

use crate::{
    api::{create_relay_routes, create_workflow_routes, AppState},
    config::Config,
    remote::{HttpRemoteStore, RemoteStore},
    session::SessionHub,
    sync::{ChangeOriginTracker, RemotePoller, SyncEngine, WatchBridge, WatchHandle},
    workflow::SnapshotStore,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Long-lived background services; dropping this stops the watcher
pub struct Services {
    pub state: AppState,
    pub watcher: WatchHandle,
    pub poller: Option<Arc<RemotePoller>>,
}

/// Initialize tracing once for the process
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .try_init();
}

/// Build the sync engine and its collaborators for a remote store
pub fn build_engine(config: &Config, remote: Arc<dyn RemoteStore>) -> Arc<SyncEngine> {
    let snapshots = SnapshotStore::new(&config.sync.workflows_dir);
    let tracker = Arc::new(ChangeOriginTracker::new(config.sync.echo_grace()));
    let hub = Arc::new(SessionHub::new());
    Arc::new(SyncEngine::new(remote, snapshots, tracker, hub))
}

/// Assemble the HTTP router for a ready application state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // REST mirror of the engine
        .merge(create_workflow_routes())
        // Same routes under /api for tools that expect the prefix
        .nest("/api", create_workflow_routes())
        // Live session relay
        .merge(create_relay_routes())
        .with_state(state)
}

/// Start every background service around an engine
///
/// Downloads the default workflow first so the local file and the poller
/// start from the remote's current content. A failed initial download is
/// logged, not fatal.
pub async fn start_services(config: &Config, engine: Arc<SyncEngine>) -> Result<Services> {
    tracing::info!("📁 Ensuring workflows directory exists: {}", config.sync.workflows_dir);
    engine
        .snapshots()
        .ensure_dir()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create workflows directory: {}", e))?;

    tracing::info!("👀 Starting filesystem watch bridge");
    let bridge = Arc::new(WatchBridge::new(Arc::clone(&engine), config.sync.watch_debounce()));
    let watcher = bridge.spawn()?;

    if let Some(workflow_id) = &config.remote.default_workflow_id {
        tracing::info!("📥 Initial download of workflow {}", workflow_id);
        match engine.pull(workflow_id).await {
            Ok(report) => tracing::info!("✅ Initial workflow {} synced from remote", report.workflow_id),
            Err(e) => tracing::error!("❌ Error during initial sync of {}: {}", workflow_id, e),
        }
    }

    let poller = match &config.sync.poll_schedule {
        Some(schedule) => {
            let poller = Arc::new(RemotePoller::new(
                Arc::clone(&engine),
                config.remote.default_workflow_id.clone(),
            ));
            poller
                .start(schedule)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to start remote poller: {}", e))?;
            Some(poller)
        }
        None => {
            tracing::info!("⏸️ Remote polling disabled");
            None
        }
    };

    let state = AppState {
        hub: Arc::clone(engine.hub()),
        engine,
    };

    Ok(Services {
        state,
        watcher,
        poller,
    })
}

/// Start the relay server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing::info!("Starting flowsync relay...");
    tracing::info!("🌍 Remote automation server: {}", config.remote.base_url);

    let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::from_config(&config.remote));
    let engine = build_engine(&config, remote);
    let services = start_services(&config, engine).await?;

    let app = build_router(services.state.clone());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(poller) = &services.poller {
        poller.stop().await?;
    }
    tracing::info!("👋 flowsync relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown requested");
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
