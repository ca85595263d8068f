//! Event classification: raw text frame -> acknowledgment or typed event.
//!
//! Rules, in order:
//! 1. The frame must be a JSON object, otherwise `DecodeError::Malformed`.
//! 2. A non-null `reply_to` makes the frame an acknowledgment, whatever its
//!    `type` says.
//! 3. The `type` discriminator selects a decoder from the `EventRegistry`.
//!    Absent, non-string, or unregistered discriminators yield
//!    `RtmEvent::Unknown` carrying the raw payload.
//! 4. A registered decoder that fails yields `DecodeError::InvalidEvent`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::DecodeError;
use crate::protocol::ack::AckMessage;
use crate::protocol::event::RtmEvent;

/// Decoder for one discriminator. Receives the whole frame.
pub type DecodeFn = fn(&RawValue) -> serde_json::Result<RtmEvent>;

/// Result of classifying one inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Reply to an outbound message; routed to the correlation table.
    Ack(AckMessage),
    /// Everything else; routed to subscribers.
    Event(RtmEvent),
}

/// Discriminator -> decoder table.
///
/// `EventRegistry::default()` knows the standard vocabulary; callers may add
/// or override entries before handing the registry to a `Classifier`.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    decoders: HashMap<String, DecodeFn>,
}

fn decode<T: DeserializeOwned>(raw: &RawValue) -> serde_json::Result<T> {
    serde_json::from_str(raw.get())
}

impl Default for EventRegistry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register("hello", |_| Ok(RtmEvent::Hello));
        r.register("presence_change", |raw| decode(raw).map(RtmEvent::PresenceChange));
        r.register("manual_presence_change", |raw| {
            decode(raw).map(RtmEvent::ManualPresenceChange)
        });
        r.register("user_typing", |raw| decode(raw).map(RtmEvent::UserTyping));
        r.register("pref_change", |raw| decode(raw).map(RtmEvent::PrefChange));
        r.register("user_change", |raw| decode(raw).map(RtmEvent::UserChange));
        r.register("bot_added", |raw| decode(raw).map(RtmEvent::BotAdded));
        r.register("bot_changed", |raw| decode(raw).map(RtmEvent::BotChanged));
        r.register("email_domain_changed", |raw| {
            decode(raw).map(RtmEvent::EmailDomainChanged)
        });
        r.register("emoji_changed", |raw| decode(raw).map(RtmEvent::EmojiChanged));
        r.register("commands_changed", |raw| decode(raw).map(RtmEvent::CommandsChanged));
        r.register("accounts_changed", |_| Ok(RtmEvent::AccountsChanged));
        r.register("reconnect_url", |raw| decode(raw).map(RtmEvent::ReconnectUrl));
        r.register("session_resume", |raw| decode(raw).map(RtmEvent::ReconnectUrl));
        r.register("message", |raw| decode(raw).map(RtmEvent::Message));
        r.register("desktop_notification", |raw| {
            decode(raw).map(RtmEvent::DesktopNotification)
        });
        r
    }
}

impl EventRegistry {
    /// Registry with no decoders; every frame classifies as `Unknown`.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a decoder, returning the one it replaced.
    pub fn register(&mut self, event_type: impl Into<String>, f: DecodeFn) -> Option<DecodeFn> {
        self.decoders.insert(event_type.into(), f)
    }

    pub fn get(&self, event_type: &str) -> Option<DecodeFn> {
        self.decoders.get(event_type).copied()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

/// Only the routing fields; everything else is skipped.
#[derive(Deserialize)]
struct RoutingFields {
    #[serde(rename = "type", default)]
    event_type: Option<Value>,
    #[serde(default)]
    reply_to: Option<Value>,
}

/// Stateless frame classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    registry: EventRegistry,
}

impl Classifier {
    pub fn new(registry: EventRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Classify one text frame.
    pub fn classify(&self, frame: &str) -> Result<Inbound, DecodeError> {
        // A derived struct also accepts JSON arrays positionally; refuse them up front.
        if !frame.trim_start().starts_with('{') {
            return Err(DecodeError::Malformed("frame is not a JSON object".into()));
        }
        let routing: RoutingFields =
            serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if routing.reply_to.as_ref().is_some_and(|v| !v.is_null()) {
            let ack: AckMessage =
                serde_json::from_str(frame).map_err(|e| DecodeError::InvalidAck(e.to_string()))?;
            return Ok(Inbound::Ack(ack));
        }

        let raw: &RawValue =
            serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let event_type = match routing.event_type {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let Some(decode) = event_type.as_deref().and_then(|t| self.registry.get(t)) else {
            tracing::trace!(event_type = ?event_type, "unrecognized discriminator");
            return Ok(Inbound::Event(RtmEvent::Unknown {
                event_type,
                raw: raw.to_owned(),
            }));
        };

        decode(raw)
            .map(Inbound::Event)
            .map_err(|e| DecodeError::InvalidEvent {
                event_type: event_type.unwrap_or_default(),
                reason: e.to_string(),
            })
    }
}
