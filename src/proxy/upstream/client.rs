// Upstream client implementation
// One-shot forwarding of an inbound request to an arbitrary target

use crate::error::{AppResult, GatewayError};
use crate::proxy::config::UpstreamProxyConfig;
use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, HeaderName, Method};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Response};
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

/// Scheme prepended to targets that name only a host
const DEFAULT_SCHEME: &str = "https://";

/// Chunks buffered between the inbound body and the outbound request
const BODY_CHANNEL_CAPACITY: usize = 8;

/// Connection-scoped headers; never forwarded in either direction
const HOP_BY_HOP_HEADERS: [HeaderName; 5] = [
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name)
        || name.as_str().eq_ignore_ascii_case("keep-alive")
        || name.as_str().eq_ignore_ascii_case("proxy-connection")
}

/// Build the upstream URL from the path remainder after `/proxy/`.
///
/// A target without a leading `scheme://` gets `https://`. The inbound query string is carried
/// over unchanged.
pub fn resolve_target(target: &str, query: Option<&str>) -> Result<Url, GatewayError> {
    let mut raw = if has_scheme(target) {
        target.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, target)
    };
    if let Some(qs) = query {
        raw.push('?');
        raw.push_str(qs);
    }

    Url::parse(&raw)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid proxy target '{}': {}", raw, e)))
}

/// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )` followed by `://`
fn has_scheme(target: &str) -> bool {
    let Some((scheme, _)) = target.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Copy inbound headers for the outbound request, keeping repeated values in order
pub fn forwardable_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if *name == header::HOST || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Hand the inbound body to reqwest chunk by chunk.
///
/// axum's body is not `Sync`, which reqwest requires of a streamed body, so a task pumps it
/// through a channel. A body known to be empty yields `None` so no framing is sent at all.
fn stream_request_body(body: Body) -> Option<reqwest::Body> {
    if body.size_hint().exact() == Some(0) {
        return None;
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, axum::Error>>(BODY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            if tx.send(chunk).await.is_err() {
                // Upstream request was dropped
                break;
            }
        }
    });

    Some(reqwest::Body::wrap_stream(ReceiverStream::new(rx)))
}

pub struct UpstreamClient {
    http_client: Client,
}

impl UpstreamClient {
    pub fn new(proxy_config: Option<UpstreamProxyConfig>) -> AppResult<Self> {
        let http_client = crate::utils::http::create_client_with_proxy(proxy_config)?;
        Ok(Self { http_client })
    }

    /// Send the request once and return the response with its body still unread
    pub async fn forward(
        &self,
        method: Method,
        url: Url,
        inbound_headers: &HeaderMap,
        body: Body,
    ) -> Result<Response, GatewayError> {
        tracing::debug!("Forwarding {} {}", method, url);

        let mut builder = self
            .http_client
            .request(method, url)
            .headers(forwardable_request_headers(inbound_headers));
        if let Some(body) = stream_request_body(body) {
            builder = builder.body(body);
        }

        builder.send().await.map_err(|e| {
            if e.is_builder() {
                GatewayError::BadRequest(e.to_string())
            } else {
                GatewayError::BadGateway(e.to_string())
            }
        })
    }
}
