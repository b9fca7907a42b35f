use crate::error::AppResult;
use crate::models::AppConfig;
use crate::modules::db::QueryGateway;
use crate::proxy::upstream::client::UpstreamClient;
use axum::{
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<QueryGateway>,
    pub upstream: Arc<UpstreamClient>,
    pub max_query_body_bytes: usize,
}

/// Build the router: gateway routes first, static files for everything else
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    use crate::proxy::handlers;

    Router::new()
        .route("/query", any(handlers::query::handle_query))
        .route("/proxy/", any(handlers::forward::handle_proxy))
        .route("/proxy/*target", any(handlers::forward::handle_proxy))
        .route("/healthz", get(health_check_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            crate::proxy::middleware::request_logging_middleware,
        ))
        .with_state(state)
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: SocketAddr,
}

impl AxumServer {
    /// Bind the listener and start accepting connections on a background task
    pub async fn start(
        config: &AppConfig,
        state: AppState,
    ) -> AppResult<(Self, tokio::task::JoinHandle<()>)> {
        let app = build_router(state, &config.static_dir);

        // Bind address
        let addr = format!("{}:{}", config.get_bind_address(), config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Gateway listening at http://{}", local_addr);

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        // Start server in new task
        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .with_upgrades()
                                        .await
                                    {
                                        debug!("Connection handling finished or errored: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Gateway stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                shutdown_tx: Some(shutdown_tx),
                local_addr,
            },
            handle,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Health check handler
async fn health_check_handler() -> Response {
    Json(serde_json::json!({
        "status": "ok"
    }))
    .into_response()
}
