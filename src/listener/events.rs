//! Inbound event envelopes and the records emitted for them.
//!
//! ComfyUI frames look like `{"type": "<kind>", "data": {...}}`.
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

/// Event type tag that matches every envelope.
pub const ALL_EVENTS: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Only(String),
}

impl EventFilter {
    pub fn from_event_type(event_type: &str) -> Self {
        if event_type == ALL_EVENTS {
            EventFilter::All
        } else {
            EventFilter::Only(event_type.to_string())
        }
    }

    /// `All` passes any tag, including a missing or non-string one.
    pub fn matches(&self, kind: &Value) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(expected) => kind.as_str() == Some(expected.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub kind: Value,
    #[serde(default)]
    pub data: Value,
}

impl EventEnvelope {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn into_record(self, instance_id: &str, original_url: &str) -> Value {
        json!({
            "event": self.kind,
            "data": self.data,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "instance_id": instance_id,
            "original_url": original_url,
        })
    }
}

/// Turn one inbound frame into an output record, if it passes the filter.
///
/// Frames that fail to parse are logged and dropped.
pub fn record_for_frame(
    frame: &[u8],
    filter: &EventFilter,
    instance_id: &str,
    original_url: &str,
) -> Option<Value> {
    let envelope = match EventEnvelope::parse(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "Error processing WebSocket message");
            return None;
        }
    };
    if !filter.matches(&envelope.kind) {
        tracing::trace!(kind = %envelope.kind, "Dropping unmatched event");
        return None;
    }
    Some(envelope.into_record(instance_id, original_url))
}
