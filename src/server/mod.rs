//! HTTP API over the campaign engine (`dialflow serve`).

pub mod api;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::events::CallEvents;
use crate::gateway::HttpCallGateway;
use crate::store::{Database, DbHandle};

use api::AppState;

/// Start the API server and block until shutdown.
pub async fn start_server(config: &Config, dev_mode: bool) -> Result<()> {
    config.ensure_directories()?;

    let db = Database::open(&config.db_path).context("Failed to open dialflow database")?;
    let gateway = HttpCallGateway::new(
        config.settings.bridge.base_url.clone(),
        config.gateway_timeout(),
    )?;

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        gateway: Arc::new(gateway),
        events: Arc::new(CallEvents::new()),
        running: std::sync::Mutex::new(HashSet::new()),
        pacing: config.pacing(),
    });

    let mut app = api::api_router().with_state(state);
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.settings.server.host, config.settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!("dialflow API listening on http://{}", local_addr);
    println!("dialflow API running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
