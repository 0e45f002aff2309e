// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;

use crate::application::controller::DashboardController;
use crate::application::session::DashboardSession;
use crate::application::sources::SettingsStore;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::session_cache::FileSessionCache;
use crate::infrastructure::settings_store::FileSettingsStore;
use crate::infrastructure::upstream_client::UpstreamClient;
use crate::presentation::app_state::AppState;
use crate::presentation::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_app_config().context("Failed to load configuration")?;

    // Initialize tracing; the guards flush the log files on exit
    let _log_guards = init_logging(&config.storage.log_dir())?;

    // Create adapters (infrastructure layer)
    let upstream = Arc::new(UpstreamClient::new(
        &config.upstream,
        config.storage.taglist_cache_path(),
    )?);
    let settings = Arc::new(FileSettingsStore::new(
        config.storage.site_settings_path(),
        config.storage.tag_settings_path(),
    ));
    let session_cache = Arc::new(FileSessionCache::new(
        config.storage.raw_table_cache_path(),
        config.storage.coverage_cache_path(),
    ));

    // Create session (application layer)
    let mut session = DashboardSession::new(
        upstream.clone(),
        upstream.clone(),
        config.upstream.max_concurrent_fetches,
    )
    .with_cache(session_cache);
    session.apply_site_settings(&settings.load_site_settings().await?);
    if let Err(e) = session.restore_cache().await {
        tracing::warn!("Ignoring cached readings: {:#}", e);
    }

    // Create application state
    let state = Arc::new(AppState {
        controller: DashboardController::new(session),
        settings,
    });

    // Build router (presentation layer)
    let router = build_router(state.clone());

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Starting data-extraction-tool on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    state.controller.dispose().await;
    Ok(())
}
