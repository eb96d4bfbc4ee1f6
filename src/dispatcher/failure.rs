//! Failure classification and remediation suggestions for dispatcher calls.
use std::fmt;

use serde_json::{json, Value};

use crate::error::AppError;

/// Where a failed call broke down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Forbidden,
    NotFound,
    InternalServerError,
    Status(u16),
    ConnectionRefused,
    TimedOut,
    /// Transport failure without a more specific cause.
    Network,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => FailureKind::Forbidden,
            404 => FailureKind::NotFound,
            500 => FailureKind::InternalServerError,
            other => FailureKind::Status(other),
        }
    }
}

/// A normalized failure: what went wrong, where, and what to try next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub kind: FailureKind,
    pub message: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub url: Option<String>,
}

impl RequestFailure {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let status = err.status();
        let kind = match status {
            Some(status) => FailureKind::from_status(status.as_u16()),
            None if err.is_timeout() => FailureKind::TimedOut,
            None if is_connection_refused(err) => FailureKind::ConnectionRefused,
            None => FailureKind::Network,
        };
        RequestFailure {
            kind,
            message: err.to_string(),
            status: status.map(|s| s.as_u16()),
            status_text: status.and_then(|s| s.canonical_reason()).map(String::from),
            url: err.url().map(|u| u.to_string()),
        }
    }

    pub fn from_app_error(err: &AppError) -> Self {
        match err {
            AppError::HttpClient(e) => Self::from_reqwest(e),
            AppError::Api(failure) => (**failure).clone(),
            other => RequestFailure {
                kind: FailureKind::Network,
                message: other.to_string(),
                status: None,
                status_text: None,
                url: None,
            },
        }
    }

    pub fn suggestion(&self) -> String {
        match self.kind {
            FailureKind::Forbidden => concat!(
                "403 Forbidden - Check the following items:\n",
                "1. Is the ComfyUI server running correctly\n",
                "2. Is the server URL correct (usually http://127.0.0.1:8188)\n",
                "3. Check ComfyUI startup parameters to ensure access restrictions are not enabled\n",
                "4. If using --listen parameter, ensure external access is allowed\n",
                "5. Check firewall settings"
            )
            .to_string(),
            FailureKind::NotFound => concat!(
                "404 Not Found - API endpoint does not exist, possible reasons:\n",
                "1. ComfyUI version is too old and does not support this API\n",
                "2. Incorrect URL path\n",
                "3. Server configuration issues"
            )
            .to_string(),
            FailureKind::InternalServerError => concat!(
                "500 Internal Server Error - ComfyUI server internal error:\n",
                "1. Check ComfyUI server logs\n",
                "2. Restart ComfyUI server\n",
                "3. Check server resource usage"
            )
            .to_string(),
            FailureKind::ConnectionRefused => concat!(
                "Connection refused - ComfyUI server is not running or not accessible:\n",
                "1. Ensure ComfyUI server is running\n",
                "2. Check if server address and port are correct\n",
                "3. Check network connection"
            )
            .to_string(),
            FailureKind::TimedOut => concat!(
                "Request timeout - Server response is slow:\n",
                "1. Check network connection\n",
                "2. Increase timeout time\n",
                "3. Check server load"
            )
            .to_string(),
            FailureKind::Status(status) => format!(
                "HTTP {} error: {}",
                status,
                self.status_text.as_deref().unwrap_or(&self.message)
            ),
            FailureKind::Network => format!("Network error: {}", self.message),
        }
    }

    /// The record emitted in place of a result when the host continues on failure.
    pub fn to_record(&self) -> Value {
        json!({
            "error": self.message,
            "status": self.status,
            "statusText": self.status_text,
            "url": self.url,
            "suggestion": self.suggestion(),
        })
    }

    pub fn into_error(self) -> AppError {
        AppError::Api(Box::new(self))
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.map_or_else(|| "no status".to_string(), |s| s.to_string());
        write!(
            f,
            "ComfyUI API Error ({}): {}\nURL: {}\nSuggestion: {}",
            status,
            self.message,
            self.url.as_deref().unwrap_or("<none>"),
            self.suggestion()
        )
    }
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        source = cause.source();
    }
    false
}
