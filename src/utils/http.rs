use crate::proxy::config::UpstreamProxyConfig;
use reqwest::{Client, Proxy};

/// Create an HTTP client with the given outbound proxy configuration.
///
/// No request timeout is set: forwarded calls run until the upstream or the caller gives up.
pub fn create_client_with_proxy(
    proxy_config: Option<UpstreamProxyConfig>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(config) = proxy_config {
        if config.enabled && !config.url.is_empty() {
            match Proxy::all(&config.url) {
                Ok(proxy) => {
                    builder = builder.proxy(proxy);
                    tracing::info!("HTTP client upstream proxy enabled: {}", config.url);
                }
                Err(e) => {
                    tracing::error!("Invalid proxy address: {}, error: {}", config.url, e);
                }
            }
        }
    }

    builder.build()
}
