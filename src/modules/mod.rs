pub mod config;
pub mod db;
pub mod logger;
pub mod marshal;
pub mod startup;

// Re-export the pieces the server wires together
pub use config::load_app_config;
pub use db::{ConnectionPool, QueryGateway};
pub use marshal::{BlobEncoding, ResultMarshaler};
