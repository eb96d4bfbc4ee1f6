//! Thin HTTP client for the ComfyUI management endpoints.
//!
//! - `get_json` / `post_json` issue a single request against one path.
//! - `get_with_fallback` / `post_with_fallback` try a [`Route`]'s primary path
//!   and, on any failure, retry exactly once against its `/api` alternate.
//!
//! Read-style calls send only the auth header; `Content-Type` is attached to
//! POST requests alone since some servers reject it on bodyless GETs.
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::auth::AuthHeader;
use crate::error::{AppError, AppResult};

/// Per-request timeout applied to queue-category calls.
pub const QUEUE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A primary path plus the optional alternate tried after it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub primary: &'static str,
    pub fallback: Option<&'static str>,
}

impl Route {
    pub const fn direct(path: &'static str) -> Self {
        Route { primary: path, fallback: None }
    }

    pub const fn with_fallback(primary: &'static str, fallback: &'static str) -> Self {
        Route { primary, fallback: Some(fallback) }
    }
}

/// Strip surrounding whitespace and any trailing slashes from a base URL.
pub fn resolve_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    auth_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ComfyUIClient {
    pub fn new(base_url: String) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] so invocations share a pool.
    pub fn with_client(client: Client, base_url: String) -> Self {
        ComfyUIClient {
            client,
            base_url: resolve_base_url(&base_url),
            auth_headers: HeaderMap::new(),
            timeout: None,
        }
    }

    pub fn with_auth(mut self, auth: Option<&AuthHeader>) -> AppResult<Self> {
        self.auth_headers.clear();
        if let Some(auth) = auth {
            let name = HeaderName::from_bytes(auth.name.as_bytes())
                .map_err(|e| AppError::Config(format!("Invalid header key '{}': {}", auth.name, e)))?;
            let mut value = HeaderValue::from_str(&auth.value)
                .map_err(|e| AppError::Config(format!("Invalid header value for '{}': {}", auth.name, e)))?;
            value.set_sensitive(true);
            self.auth_headers.insert(name, value);
        }
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and return the response body, parsed as JSON when possible.
    pub async fn get_json(&self, path: &str) -> AppResult<Value> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);
        let request = self.client.get(&url).headers(self.auth_headers.clone());
        let response = self.apply_timeout(request).send().await?.error_for_status()?;
        let text = response.text().await?;
        Ok(parse_body(text))
    }

    /// POST a JSON body to `path`. The response body is read and discarded.
    pub async fn post_json(&self, path: &str, body: &Value) -> AppResult<()> {
        let url = self.url(path);
        tracing::debug!("POST {} body={}", url, body);
        let mut headers = self.auth_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = self.client.post(&url).headers(headers).json(body);
        let response = self.apply_timeout(request).send().await?.error_for_status()?;
        let _ = response.bytes().await?;
        Ok(())
    }

    pub async fn get_with_fallback(&self, route: Route) -> AppResult<Value> {
        self.with_fallback(route, |path| self.get_json(path)).await
    }

    pub async fn post_with_fallback(&self, route: Route, body: &Value) -> AppResult<()> {
        self.with_fallback(route, |path| self.post_json(path, body)).await
    }

    /// Run `attempt` against the primary path, then once against the fallback.
    /// The fallback's error is the one that propagates.
    async fn with_fallback<T, F, Fut>(&self, route: Route, attempt: F) -> AppResult<T>
    where
        F: Fn(&'static str) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match attempt(route.primary).await {
            Ok(value) => Ok(value),
            Err(primary_err) => match route.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        "Request to {} failed ({}), retrying {}",
                        self.url(route.primary),
                        primary_err,
                        self.url(fallback),
                    );
                    attempt(fallback).await
                }
                None => Err(primary_err),
            },
        }
    }

    fn apply_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
