//! Shared state and router for the HTTP host.
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::{
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::api::handlers;
use crate::dispatcher::Dispatcher;
use crate::host::{Emitter, HeaderCredential};
use crate::listener::ListenerHandle;

/// Records held per trigger between polls; older ones are dropped first.
pub const EVENT_BUFFER_CAPACITY: usize = 1024;

/// Live trigger sessions one host will hold at once.
pub const DEFAULT_TRIGGER_LIMIT: usize = 64;

pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Stored credential used when a request does not carry its own.
    pub credential: Option<HeaderCredential>,
    pub triggers: RwLock<HashMap<Uuid, TriggerSlot>>,
    pub trigger_limit: usize,
}

impl AppState {
    pub fn new(credential: Option<HeaderCredential>) -> Self {
        AppState {
            dispatcher: Dispatcher::new(),
            credential,
            triggers: RwLock::new(HashMap::new()),
            trigger_limit: DEFAULT_TRIGGER_LIMIT,
        }
    }

    pub fn with_trigger_limit(mut self, limit: usize) -> Self {
        self.trigger_limit = limit;
        self
    }
}

pub struct TriggerSlot {
    pub handle: ListenerHandle,
    pub events: EventBuffer,
}

/// Bounded in-memory sink for records emitted by a listener.
#[derive(Clone)]
pub struct EventBuffer {
    records: Arc<Mutex<VecDeque<Value>>>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        EventBuffer { records: Arc::new(Mutex::new(VecDeque::new())), capacity }
    }

    pub fn drain(&self) -> Vec<Value> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.drain(..).collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(EVENT_BUFFER_CAPACITY)
    }
}

impl Emitter for EventBuffer {
    fn emit(&self, batch: Vec<Value>) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for record in batch {
            if records.len() == self.capacity {
                records.pop_front();
                tracing::warn!("Event buffer full, dropping oldest record");
            }
            records.push_back(record);
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/execute", post(handlers::execute))
        .route("/triggers", post(handlers::create_trigger))
        .route("/triggers/:id", axum::routing::delete(handlers::delete_trigger))
        .route("/triggers/:id/events", get(handlers::trigger_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
