//! Acknowledgment frames.
//!
//! An ack has no discriminator of its own: it is recognized by the presence
//! of `reply_to`, the id the client attached to the outbound message.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtmError};

/// Structured error carried by a failed acknowledgment.
///
/// Both fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckError {
    #[serde(default)]
    pub code: i64,
    #[serde(default, alias = "message")]
    pub msg: String,
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {} - {}", self.code, self.msg)
    }
}

/// Reply to a message previously sent on the channel.
#[derive(Debug, Clone, Deserialize)]
pub struct AckMessage {
    /// Correlation id of the outbound message.
    pub reply_to: u64,
    /// Server timestamp assigned to the message.
    #[serde(default)]
    pub ts: String,
    /// Echoed message text.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<AckError>,
}

/// Successful delivery of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub reply_to: u64,
    pub ts: String,
    pub text: String,
}

impl AckMessage {
    /// Whether the server accepted the message.
    ///
    /// Replies without an `ok` flag (e.g. `pong`) count as success unless
    /// they carry an error object.
    pub fn is_ok(&self) -> bool {
        self.ok.unwrap_or(self.error.is_none())
    }

    /// Turn the reply into the outcome handed to the waiting sender.
    pub fn into_outcome(self) -> Result<Delivered> {
        if self.is_ok() {
            Ok(Delivered {
                reply_to: self.reply_to,
                ts: self.ts,
                text: self.text,
            })
        } else {
            Err(RtmError::Rejected(self.error.unwrap_or_default()))
        }
    }
}
