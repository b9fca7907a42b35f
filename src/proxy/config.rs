use serde::{Deserialize, Serialize};

/// Outbound proxy for the forwarder's own HTTP client
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    /// Whether to route upstream calls through `url`
    pub enabled: bool,
    /// Proxy address (http://, https://, socks5://)
    pub url: String,
}
