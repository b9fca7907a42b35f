pub mod config;
pub mod query;

pub use config::{AppConfig, DatabaseConfig};
pub use query::{QueryRequest, ResultRow, ResultSet, Scalar};
