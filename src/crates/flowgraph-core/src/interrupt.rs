//! Interrupt payloads
//!
//! A node that parks its thread surfaces a payload of the shape
//! `{type, message, ...}`. [`Interrupt`] is the typed view of that payload:
//! `kind` is the discriminating `type` field, `message` is the human text
//! shown to the caller, and any further fields ride along in `extra`.
//! Callers inspecting a raw payload convert with `Interrupt::try_from`
//! instead of indexing JSON by hand.

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Typed view of an interrupt payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    /// Discriminator, e.g. `need_user_feedback`
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable description of what the thread is waiting for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Any further payload fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Interrupt {
    /// Create an interrupt of the given kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether this interrupt is of the given kind
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// The message, or the given fallback when none was supplied
    pub fn message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.message.as_deref().unwrap_or(fallback)
    }

    /// Serialize back into the `{type, message, ...}` wire shape
    pub fn into_value(self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), Value::String(self.kind));
        if let Some(message) = self.message {
            map.insert("message".to_string(), Value::String(message));
        }
        for (key, value) in self.extra {
            map.insert(key, value);
        }
        Value::Object(map)
    }
}

impl TryFrom<&Value> for Interrupt {
    type Error = GraphError;

    fn try_from(payload: &Value) -> Result<Self, Self::Error> {
        let map = payload.as_object().ok_or_else(|| {
            GraphError::Validation("interrupt payload must be an object".to_string())
        })?;
        let kind = map
            .get("type")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                GraphError::Validation("interrupt payload is missing 'type'".to_string())
            })?
            .to_string();
        let message = map
            .get("message")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());
        let extra = map
            .iter()
            .filter(|(key, _)| key.as_str() != "type" && key.as_str() != "message")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Self {
            kind,
            message,
            extra,
        })
    }
}

impl TryFrom<Value> for Interrupt {
    type Error = GraphError;

    fn try_from(payload: Value) -> Result<Self, Self::Error> {
        Interrupt::try_from(&payload)
    }
}
