use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use mise_router::config::Settings;
use mise_router::database::{DbPool, SessionRepository};
use mise_router::handlers::build_router;
use mise_router::logging::init_logger;
use mise_router::services::conversation::SessionCache;
use mise_router::services::{OllamaService, RouterService};
use mise_router::state::AppState;
use mise_router::utils::clock::SystemClock;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    init_logger()?;
    info!("Starting mise-router v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database pool + schema
    let db_pool = DbPool::new(&settings.database).await?;
    let repository = SessionRepository::new(db_pool.clone());
    repository.init_schema().await?;
    info!("Database ready at {}", settings.database.url);

    // Session cache with periodic write-back
    let cache = Arc::new(SessionCache::new(
        Arc::new(repository),
        Arc::new(SystemClock),
        settings.cache.clone(),
    ));
    cache.start();

    let ollama = Arc::new(OllamaService::new(settings.ollama.clone())?);
    let router_service = Arc::new(RouterService::from_settings(&settings, cache.clone(), ollama));

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    let app = build_router(AppState::new(router_service, settings));

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    cache.stop().await;
    db_pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
