//! Axum request handlers for the HTTP host.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::api::routes::{AppState, EventBuffer, TriggerSlot};
use crate::error::AppError;
use crate::host::{HeaderCredential, ItemParameters};
use crate::listener::{self, config::ListenerConfig};

type HandlerResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub credentials: Option<HeaderCredential>,
    #[serde(default)]
    pub continue_on_fail: bool,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub credentials: Option<HeaderCredential>,
}

pub async fn root() -> &'static str {
    "ComfyUI node host"
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> HandlerResult {
    let credential = payload.credentials.or_else(|| state.credential.clone());
    let params = ItemParameters::new(payload.parameters, payload.items);
    state
        .dispatcher
        .execute(&params, params.item_count(), credential.as_ref(), payload.continue_on_fail)
        .await
        .map(|records| Json(Value::Array(records)))
        .map_err(error_response)
}

pub async fn create_trigger(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TriggerRequest>,
) -> HandlerResult {
    let credential = payload.credentials.or_else(|| state.credential.clone());
    let config = ListenerConfig::from_parameters(&payload.parameters, credential.as_ref())
        .map_err(error_response)?;

    let mut triggers = state.triggers.write().await;
    if triggers.len() >= state.trigger_limit {
        tracing::warn!(limit = state.trigger_limit, "Trigger limit reached");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": format!("At most {} triggers may be active", state.trigger_limit)})),
        ));
    }
    let events = EventBuffer::default();
    let handle = listener::activate(config, events.clone()).map_err(error_response)?;

    let id = Uuid::new_v4();
    let client_id = handle.client_id();
    triggers.insert(id, TriggerSlot { handle, events });
    drop(triggers);
    tracing::info!(trigger_id = %id, %client_id, "Trigger activated");
    Ok(Json(json!({"id": id, "clientId": client_id})))
}

pub async fn trigger_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult {
    let triggers = state.triggers.read().await;
    let slot = triggers.get(&id).ok_or_else(|| not_found(id))?;
    Ok(Json(Value::Array(slot.events.drain())))
}

pub async fn delete_trigger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult {
    let slot = state.triggers.write().await.remove(&id);
    let mut slot = slot.ok_or_else(|| not_found(id))?;
    slot.handle.deactivate().await;
    tracing::info!(trigger_id = %id, "Trigger deactivated");
    Ok(Json(json!({"id": id, "stopped": true})))
}

fn error_response(err: AppError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        AppError::Parameter { .. } | AppError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    tracing::error!("Request failed: {}", err);
    (status, Json(json!({"error": err.to_string()})))
}

fn not_found(id: Uuid) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": format!("Trigger {} not found", id)})))
}
