pub mod error;
pub mod models;
pub mod modules;
pub mod proxy; // HTTP surface: query endpoint, forwarder, static files
mod utils;

use modules::{logger, startup};
use proxy::upstream::UpstreamClient;
use proxy::{AppState, AxumServer};
use std::sync::Arc;
use tracing::info;

/// Start the gateway and serve until Ctrl+C.
///
/// Opening the database and binding the port are the only fatal steps.
pub async fn run() -> anyhow::Result<()> {
    let config = modules::load_app_config()?;

    // Initialize logger
    logger::init_logger(config.log_dir.as_deref());
    info!("Gateway starting...");
    startup::log_environment(&config.static_dir);

    let gateway = Arc::new(modules::QueryGateway::open(&config.database)?);
    let upstream = Arc::new(UpstreamClient::new(Some(config.upstream_proxy.clone()))?);
    let state = AppState {
        gateway: gateway.clone(),
        upstream,
        max_query_body_bytes: config.max_query_body_bytes,
    };

    let (server, handle) = AxumServer::start(&config, state).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop();
    handle.await.ok();

    info!(
        "Gateway stopped after {} query executions",
        gateway.executions()
    );
    Ok(())
}
