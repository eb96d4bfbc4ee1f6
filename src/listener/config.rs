//! Listener configuration and socket target construction.
use std::time::Duration;

use reqwest::Url;
use uuid::Uuid;

use crate::auth::{resolve_auth_header, AuthHeader};
use crate::error::{AppError, AppResult};
use crate::host::{HeaderCredential, NodeParameters};
use crate::listener::events::EventFilter;
use crate::listener::session::RetryLimit;

pub const DEFAULT_PREDEFINED_EVENT: &str = "ky_monitor.queue";
pub const DEFAULT_RECONNECT_INTERVAL_SECS: f64 = 5.0;
pub const DEFAULT_MAX_RETRIES: i64 = -1;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    /// Configured server address, trimmed; echoed back as `original_url`.
    pub server_url: String,
    pub auth: Option<AuthHeader>,
    pub filter: EventFilter,
    pub reconnect_interval: Duration,
    pub retry_limit: RetryLimit,
    pub instance_id: String,
    /// Ping period; `None` disables the heartbeat.
    pub heartbeat: Option<Duration>,
}

impl ListenerConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        ListenerConfig {
            server_url: server_url.into().trim().to_string(),
            auth: None,
            filter: EventFilter::from_event_type(DEFAULT_PREDEFINED_EVENT),
            reconnect_interval: Duration::from_secs_f64(DEFAULT_RECONNECT_INTERVAL_SECS),
            retry_limit: RetryLimit::from_max_retries(DEFAULT_MAX_RETRIES),
            instance_id: String::new(),
            heartbeat: Some(Duration::from_secs_f64(DEFAULT_HEARTBEAT_INTERVAL_SECS)),
        }
    }

    pub fn from_parameters(
        params: &dyn NodeParameters,
        credential: Option<&HeaderCredential>,
    ) -> AppResult<Self> {
        let server_url = params.required_string("serverUrl", 0)?;
        let manual_key = params.string("manualHeaderKey", 0, "")?;
        let manual_value = params.string("manualHeaderValue", 0, "")?;

        let event_type = match params.string("eventTypeChoice", 0, "predefined")?.as_str() {
            "predefined" => params.string("predefinedEventType", 0, DEFAULT_PREDEFINED_EVENT)?,
            "custom" => params.string("customEventType", 0, "")?,
            other => {
                return Err(AppError::parameter(
                    "eventTypeChoice",
                    format!("expected 'predefined' or 'custom', got '{}'", other),
                ))
            }
        };

        let reconnect_interval = seconds(
            "reconnectInterval",
            params.number("reconnectInterval", 0, DEFAULT_RECONNECT_INTERVAL_SECS)?,
        )?;
        let max_retries = params.number("maxRetries", 0, DEFAULT_MAX_RETRIES as f64)?;
        let heartbeat = if params.boolean("enableHeartbeat", 0, true)? {
            let interval = seconds(
                "heartbeatInterval",
                params.number("heartbeatInterval", 0, DEFAULT_HEARTBEAT_INTERVAL_SECS)?,
            )?;
            if interval.is_zero() {
                return Err(AppError::parameter("heartbeatInterval", "must be greater than zero"));
            }
            Some(interval)
        } else {
            None
        };

        Ok(ListenerConfig {
            server_url,
            auth: resolve_auth_header(&manual_key, &manual_value, credential),
            filter: EventFilter::from_event_type(&event_type),
            reconnect_interval,
            retry_limit: RetryLimit::from_max_retries(max_retries as i64),
            instance_id: params.string("instanceId", 0, "")?,
            heartbeat,
        })
    }

    /// `{ws|wss}://{host}/ws?clientId={id}` for the configured address.
    pub fn socket_url(&self, client_id: Uuid) -> AppResult<String> {
        socket_url(&self.server_url, client_id)
    }
}

/// Rewrite a configured server address into the socket endpoint.
///
/// Secure schemes (`https`, `wss`) map to `wss`, everything else to `ws`.
/// Only the authority survives; any configured path is dropped.
pub fn socket_url(server_url: &str, client_id: Uuid) -> AppResult<String> {
    let parsed = Url::parse(server_url.trim())
        .map_err(|e| AppError::Config(format!("Invalid server URL '{}': {}", server_url, e)))?;
    let scheme = match parsed.scheme() {
        "wss" | "https" => "wss",
        _ => "ws",
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Config(format!("Server URL '{}' has no host", server_url)))?;
    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok(format!("{}://{}/ws?clientId={}", scheme, authority, client_id))
}

fn seconds(name: &str, value: f64) -> AppResult<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::parameter(name, format!("expected a non-negative number of seconds, got {}", value)));
    }
    Duration::try_from_secs_f64(value).map_err(|e| AppError::parameter(name, e.to_string()))
}
