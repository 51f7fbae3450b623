use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::info;

use todo_api_server::config::Settings;
use todo_api_server::logging::init_telemetry;
use todo_api_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Settings come first: they decide how logging is set up
    let settings = Settings::load().context("Failed to load configuration")?;
    let _log_guard = init_telemetry(&settings.logging);

    info!(
        "🚀 Starting {} ({})",
        settings.server.service_name, settings.server.environment
    );

    let addr = SocketAddr::from((
        settings
            .server
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid server.host '{}'", settings.server.host))?,
        settings.server.port,
    ));

    if let Some(dir) = &settings.server.static_dir {
        info!("✅ Serving static files from {}", dir);
    }

    let state = AppState::from_settings(settings)?;
    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
