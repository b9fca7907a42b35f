// Middleware module - Axum middleware

pub mod cors;
pub mod logging;

pub use cors::insert_cors_headers;
pub use logging::request_logging_middleware;
