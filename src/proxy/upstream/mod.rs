// Upstream module - outbound HTTP for the forwarder

pub mod client;

pub use client::{resolve_target, UpstreamClient};
