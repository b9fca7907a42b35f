// proxy module - HTTP surface of the gateway

pub mod config;
pub mod handlers; // Endpoint handlers
pub mod middleware; // Axum middleware
pub mod server;
pub mod upstream; // Upstream client

pub use config::UpstreamProxyConfig;
pub use server::{AppState, AxumServer};
