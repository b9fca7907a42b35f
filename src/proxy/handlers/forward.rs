// Forwarding Handler
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::proxy::middleware::insert_cors_headers;
use crate::proxy::server::AppState;
use crate::proxy::upstream::client::{is_hop_by_hop, resolve_target};

pub const PROXY_PREFIX: &str = "/proxy/";

/// `ANY /proxy/<target>`: relay the request to `<target>` and stream the answer back.
///
/// Every response, including errors, carries the permissive CORS headers.
pub async fn handle_proxy(State(state): State<AppState>, request: Request) -> Response {
    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Proxy request failed: {}", e);
            let mut response = e.into_response();
            insert_cors_headers(response.headers_mut());
            response
        }
    }
}

async fn forward(state: &AppState, request: Request) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();
    info!("Handling proxy request from {}", path);

    let target = path.strip_prefix(PROXY_PREFIX).unwrap_or_default();
    let url = resolve_target(target, parts.uri.query())?;

    let upstream = state
        .upstream
        .forward(parts.method, url, &parts.headers, body)
        .await?;

    // CORS first, then every upstream header appended after it
    let mut headers = HeaderMap::with_capacity(upstream.headers().len() + 3);
    insert_cors_headers(&mut headers);
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    let status = upstream.status();
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
