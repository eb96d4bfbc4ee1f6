//! Host-facing contract.
//!
//! The workflow host owns parameter storage, credentials and the execution
//! pipeline. The nodes only see these three seams:
//! - [`NodeParameters`]: typed key/value lookup scoped to one input item.
//! - [`HeaderCredential`]: the optional stored header credential.
//! - [`Emitter`]: delivers batches of output records at arbitrary times.
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{AppError, AppResult};

/// Parameter lookup for the current invocation.
///
/// `item` is the index of the input item being processed; trigger nodes
/// always pass `0`.
pub trait NodeParameters: Send + Sync {
    fn value(&self, name: &str, item: usize) -> Option<Value>;

    fn string(&self, name: &str, item: usize, default: &str) -> AppResult<String> {
        match self.value(name, item) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(AppError::parameter(name, format!("expected a string, got {}", other))),
        }
    }

    /// A string parameter that must be present and non-blank. Returned trimmed.
    fn required_string(&self, name: &str, item: usize) -> AppResult<String> {
        let value = self.string(name, item, "")?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppError::parameter(name, "a value is required"));
        }
        Ok(trimmed.to_string())
    }

    fn number(&self, name: &str, item: usize, default: f64) -> AppResult<f64> {
        match self.value(name, item) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| AppError::parameter(name, "number out of range")),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| AppError::parameter(name, format!("expected a number, got '{}'", s))),
            Some(other) => Err(AppError::parameter(name, format!("expected a number, got {}", other))),
        }
    }

    fn boolean(&self, name: &str, item: usize, default: bool) -> AppResult<bool> {
        match self.value(name, item) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(AppError::parameter(name, format!("expected a boolean, got '{}'", s))),
            },
            Some(other) => Err(AppError::parameter(name, format!("expected a boolean, got {}", other))),
        }
    }
}

/// A flat parameter map shared by every item.
impl NodeParameters for Map<String, Value> {
    fn value(&self, name: &str, _item: usize) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Shared parameters with optional per-item overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemParameters {
    #[serde(default)]
    pub shared: Map<String, Value>,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
}

impl ItemParameters {
    pub fn new(shared: Map<String, Value>, items: Vec<Map<String, Value>>) -> Self {
        ItemParameters { shared, items }
    }

    /// Number of input items; a node with no explicit items still runs once.
    pub fn item_count(&self) -> usize {
        self.items.len().max(1)
    }
}

impl NodeParameters for ItemParameters {
    fn value(&self, name: &str, item: usize) -> Option<Value> {
        self.items
            .get(item)
            .and_then(|overrides| overrides.get(name))
            .or_else(|| self.shared.get(name))
            .cloned()
    }
}

/// Stored HTTP header credential (`httpHeaderAuth` in the host).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HeaderCredential {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Sink for records produced outside a request/response cycle.
pub trait Emitter: Send + Sync + 'static {
    fn emit(&self, records: Vec<Value>);
}

impl Emitter for mpsc::UnboundedSender<Vec<Value>> {
    fn emit(&self, records: Vec<Value>) {
        if self.send(records).is_err() {
            tracing::debug!("Emit receiver dropped, discarding records");
        }
    }
}
