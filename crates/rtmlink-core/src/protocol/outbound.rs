//! Client-built outbound messages.
//!
//! The caller supplies the object; the session stamps the correlation `id`
//! at send time, so any `id` set here is overwritten.

use serde_json::{Map, Value};

use crate::error::{Result, RtmError};

/// Outbound message object (JSON).
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    fields: Map<String, Value>,
}

impl OutgoingMessage {
    /// Empty message of the given `type`.
    pub fn new(msg_type: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("type".into(), Value::String(msg_type.into()));
        Self { fields }
    }

    /// Chat message to a channel.
    pub fn message(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("message")
            .with("channel", channel.into())
            .with("text", text.into())
    }

    /// Typing indicator for a channel.
    pub fn typing(channel: impl Into<String>) -> Self {
        Self::new("typing").with("channel", channel.into())
    }

    /// Keepalive; the server replies with a `pong` carrying `reply_to`.
    pub fn ping() -> Self {
        Self::new("ping")
    }

    /// Wrap a caller-built JSON value. It must be an object with a string `type`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(RtmError::BadRequest("outbound message must be a JSON object".into()));
        };
        if !matches!(fields.get("type"), Some(Value::String(_))) {
            return Err(RtmError::BadRequest("outbound message requires a string `type`".into()));
        }
        Ok(Self { fields })
    }

    /// Set a field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize with the correlation id attached.
    pub fn encode(&self, id: u64) -> Result<String> {
        let mut fields = self.fields.clone();
        fields.insert("id".into(), Value::from(id));
        serde_json::to_string(&fields)
            .map_err(|e| RtmError::BadRequest(format!("json encode failed: {e}")))
    }
}
