//! Command dispatcher: one ComfyUI management call per input item.
//!
//! Queue operations run with a 10 second timeout and fall back once to the
//! `/api`-prefixed path. Model operations are a single request with neither.
//! Write-style queue operations report a synthesized success record instead
//! of whatever the server answered.
pub mod failure;
pub mod operations;

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::auth::{resolve_auth_header, AuthHeader};
use crate::comfyui::client::{ComfyUIClient, Route, QUEUE_REQUEST_TIMEOUT};
use crate::error::{AppError, AppResult};
use crate::host::{HeaderCredential, NodeParameters};

use self::failure::RequestFailure;
use self::operations::{ModelsOperation, Operation, QueueOperation};

const RECENT_HISTORY: Route = Route::with_fallback("/history?max_items=5", "/api/history");
const QUEUE: Route = Route::with_fallback("/queue", "/api/queue");
const INTERRUPT: Route = Route::with_fallback("/interrupt", "/api/interrupt");
const HISTORY: Route = Route::with_fallback("/history", "/api/history");
const SYSTEM_STATS: Route = Route::with_fallback("/system_stats", "/api/system_stats");

const OBJECT_INFO: Route = Route::direct("/object_info");
const SAMPLERS: Route = Route::direct("/samplers");
const SCHEDULERS: Route = Route::direct("/schedulers");
const EXTENSIONS: Route = Route::direct("/extensions");
const EMBEDDINGS: Route = Route::direct("/embeddings");

/// Everything needed to issue one operation, resolved from host parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub server_url: String,
    pub auth: Option<AuthHeader>,
    pub operation: Operation,
}

impl DispatchRequest {
    pub fn from_parameters(
        params: &dyn NodeParameters,
        item: usize,
        credential: Option<&HeaderCredential>,
    ) -> AppResult<Self> {
        let server_url = params.required_string("serverUrl", item)?;
        let manual_key = params.string("manualHeaderKey", item, "")?;
        let manual_value = params.string("manualHeaderValue", item, "")?;
        Ok(DispatchRequest {
            server_url,
            auth: resolve_auth_header(&manual_key, &manual_value, credential),
            operation: Operation::from_parameters(params, item)?,
        })
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    http: Client,
    queue_timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_client(Client::new())
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: Client) -> Self {
        Dispatcher { http, queue_timeout: QUEUE_REQUEST_TIMEOUT }
    }

    /// Override the per-request timeout of queue operations.
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Run every input item. Failed items either become error records
    /// (`continue_on_fail`) or abort the run with an annotated error.
    /// Invalid parameters abort with the parameter error itself.
    pub async fn execute(
        &self,
        params: &dyn NodeParameters,
        item_count: usize,
        credential: Option<&HeaderCredential>,
        continue_on_fail: bool,
    ) -> AppResult<Vec<Value>> {
        let mut records = Vec::with_capacity(item_count);
        for item in 0..item_count {
            match self.execute_item(params, item, credential).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    let failure = RequestFailure::from_app_error(&err);
                    tracing::error!(item, "ComfyUI operation failed: {}", failure);
                    if continue_on_fail {
                        records.push(failure.to_record());
                    } else if matches!(err, AppError::Parameter { .. } | AppError::Config(_)) {
                        return Err(err);
                    } else {
                        return Err(failure.into_error());
                    }
                }
            }
        }
        Ok(records)
    }

    pub async fn execute_item(
        &self,
        params: &dyn NodeParameters,
        item: usize,
        credential: Option<&HeaderCredential>,
    ) -> AppResult<Value> {
        let request = DispatchRequest::from_parameters(params, item, credential)?;
        self.run(&request).await
    }

    pub async fn run(&self, request: &DispatchRequest) -> AppResult<Value> {
        let client = ComfyUIClient::with_client(self.http.clone(), request.server_url.clone())
            .with_auth(request.auth.as_ref())?;
        match &request.operation {
            Operation::Queue(op) => {
                let client = client.with_timeout(Some(self.queue_timeout));
                run_queue_operation(&client, op).await
            }
            Operation::Models(op) => run_models_operation(&client, op).await,
        }
    }
}

async fn run_queue_operation(client: &ComfyUIClient, op: &QueueOperation) -> AppResult<Value> {
    tracing::info!("Running queue operation {:?} against {}", op, client.base_url());
    match op {
        QueueOperation::GetRecentHistory => client.get_with_fallback(RECENT_HISTORY).await,
        QueueOperation::GetQueueStatus => client.get_with_fallback(QUEUE).await,
        QueueOperation::ClearQueue => {
            client.post_with_fallback(QUEUE, &json!({"clear": true})).await?;
            Ok(success("Queue cleared"))
        }
        QueueOperation::InterruptExecution => {
            client.post_with_fallback(INTERRUPT, &json!({})).await?;
            Ok(success("Current execution interrupted"))
        }
        QueueOperation::ClearHistory => {
            client.post_with_fallback(HISTORY, &json!({"clear": true})).await?;
            Ok(success("History cleared"))
        }
        QueueOperation::DeleteHistoryItem { prompt_id } => {
            client.post_with_fallback(HISTORY, &json!({"delete": [prompt_id]})).await?;
            Ok(success(&format!("History item {} deleted", prompt_id)))
        }
        QueueOperation::GetSystemInfo => client.get_with_fallback(SYSTEM_STATS).await,
    }
}

async fn run_models_operation(client: &ComfyUIClient, op: &ModelsOperation) -> AppResult<Value> {
    tracing::info!("Running models operation {:?} against {}", op, client.base_url());
    match op {
        ModelsOperation::GetAllModels => client.get_with_fallback(OBJECT_INFO).await,
        ModelsOperation::GetModelsByType { model_type } => {
            let all = client.get_with_fallback(OBJECT_INFO).await?;
            Ok(filter_object_info(&all, model_type))
        }
        ModelsOperation::GetSamplers => client.get_with_fallback(SAMPLERS).await,
        ModelsOperation::GetSchedulers => client.get_with_fallback(SCHEDULERS).await,
        ModelsOperation::GetExtensions => client.get_with_fallback(EXTENSIONS).await,
        ModelsOperation::GetEmbeddings => client.get_with_fallback(EMBEDDINGS).await,
    }
}

/// Keep only `key` from the object-info map; an absent key yields `{}`.
pub fn filter_object_info(all: &Value, key: &str) -> Value {
    let mut filtered = Map::new();
    if let Some(entry) = all.get(key).filter(|v| is_truthy(v)) {
        filtered.insert(key.to_string(), entry.clone());
    }
    Value::Object(filtered)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn success(message: &str) -> Value {
    json!({"success": true, "message": message})
}
