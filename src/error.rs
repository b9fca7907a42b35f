use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Startup and lifecycle errors. Any of these ends the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Implement alias for Result to simplify usage
pub type AppResult<T> = Result<T, AppError>;

/// Per-request failures, mapped onto HTTP status codes.
///
/// Client input problems become 4xx, backend problems become 5xx. The response body is the
/// plain-text message, matching what the caller would see from the underlying library.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Only POST method is allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Execution(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Execution(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, format!("{}\n", self)).into_response()
    }
}
