// Query Handler
use axum::{
    extract::{Request, State},
    http::Method,
    response::Json,
};
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::models::{QueryRequest, ResultSet};
use crate::proxy::server::AppState;

/// `POST /query`: run one parameterized statement and return its rows as JSON.
///
/// The method is checked before the body is read, and the body is decoded before the
/// database is touched, so rejected requests have no side effects.
pub async fn handle_query(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ResultSet>, GatewayError> {
    info!("Handling query request from {}", request.uri().path());

    if request.method() != Method::POST {
        return Err(GatewayError::MethodNotAllowed);
    }

    let body = axum::body::to_bytes(request.into_body(), state.max_query_body_bytes)
        .await
        .map_err(|e| GatewayError::Internal(format!("Failed to read request body: {}", e)))?;
    debug!("Request body: {}", String::from_utf8_lossy(&body));

    let query: QueryRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Malformed query request: {}", e);
        GatewayError::BadRequest(e.to_string())
    })?;

    let result = state.gateway.execute(query).await.map_err(|e| {
        warn!("Query failed: {}", e);
        e
    })?;

    info!("Query returned {} rows", result.len());
    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(
            "Response body: {}",
            serde_json::to_string(&result).unwrap_or_default()
        );
    }

    Ok(Json(result))
}
