// Request logging middleware
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::Instrument;

/// Tag each request with an id and log method, URI, status and elapsed time
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let span = tracing::info_span!("request", id = %&request_id[..8]);

    async move {
        tracing::info!("Request: {} {}", method, uri);
        let started = Instant::now();
        let response = next.run(request).await;
        let status = response.status();
        if status.is_server_error() {
            tracing::warn!("{} {} -> {} in {:?}", method, uri.path(), status, started.elapsed());
        } else {
            tracing::info!("{} {} -> {} in {:?}", method, uri.path(), status, started.elapsed());
        }
        response
    }
    .instrument(span)
    .await
}
