use crate::modules::marshal::BlobEncoding;
use crate::proxy::config::UpstreamProxyConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listening port
    pub port: u16,

    /// Whether to accept connections from other hosts
    /// - true: listen on 0.0.0.0 (default)
    /// - false: listen on 127.0.0.1 only
    pub allow_lan_access: bool,

    /// Directory served for every path not claimed by the gateway routes
    pub static_dir: PathBuf,

    /// Daily rolling log files are written here when set
    pub log_dir: Option<PathBuf>,

    /// Upper bound on a `/query` request body
    pub max_query_body_bytes: usize,

    pub database: DatabaseConfig,

    /// Outbound proxy used by the forwarder
    pub upstream_proxy: UpstreamProxyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub pool_size: usize,
    pub busy_timeout_ms: u64,
    pub blob_encoding: BlobEncoding,
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            port: 8080,
            allow_lan_access: true,
            static_dir: PathBuf::from("."),
            log_dir: None,
            max_query_body_bytes: 100 * 1024 * 1024,
            database: DatabaseConfig::default(),
            upstream_proxy: UpstreamProxyConfig::default(),
        }
    }

    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.db"),
            pool_size: 8,
            busy_timeout_ms: 5000,
            blob_encoding: BlobEncoding::Text,
        }
    }
}
