//! Common error type and result alias.
use crate::dispatcher::failure::RequestFailure;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Transport or status failure reported by reqwest.
    #[error("{0}")]
    HttpClient(#[from] reqwest::Error),

    /// A dispatcher failure after classification, ready to surface to the host.
    #[error("{0}")]
    Api(Box<RequestFailure>),

    #[error("Invalid parameter '{name}': {reason}")]
    Parameter { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn parameter(name: &str, reason: impl Into<String>) -> Self {
        AppError::Parameter { name: name.to_string(), reason: reason.into() }
    }
}
