//! Shared error type across rtmlink crates.

use thiserror::Error;

use crate::protocol::ack::AckError;

/// Stable error codes surfaced to callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed message or config.
    BadRequest,
    /// Unsupported config or protocol version.
    UnsupportedVersion,
    /// Session is not in the `Connected` state.
    NotConnected,
    /// The connection generation ended before an acknowledgment arrived.
    ConnectionLost,
    /// The session was closed by the caller.
    Closed,
    /// No acknowledgment within the caller's deadline.
    Timeout,
    /// Correlation id already pending.
    DuplicateId,
    /// The server acknowledged with `ok: false`.
    Rejected,
    /// Transport-level failure (connect, read, write).
    Transport,
    /// Inbound frame could not be decoded.
    Decode,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and notices.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::ConnectionLost => "CONNECTION_LOST",
            ErrorCode::Closed => "CLOSED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::DuplicateId => "DUPLICATE_ID",
            ErrorCode::Rejected => "REJECTED",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Decode => "DECODE",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Classification failure for a single inbound frame.
///
/// Kept apart from "unknown type", which is not an error at all: an
/// unrecognized discriminator decodes to `RtmEvent::Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame is not a JSON object.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The frame carries `reply_to` but the acknowledgment fields are corrupt.
    #[error("invalid ack: {0}")]
    InvalidAck(String),
    /// A registered discriminator whose payload did not match its shape.
    #[error("invalid `{event_type}` event: {reason}")]
    InvalidEvent { event_type: String, reason: String },
}

impl DecodeError {
    /// Discriminator of the offending frame, when one was recognized.
    pub fn event_type(&self) -> Option<&str> {
        match self {
            DecodeError::InvalidEvent { event_type, .. } => Some(event_type),
            _ => None,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, RtmError>;

/// Unified error type used by core and client.
#[derive(Debug, Clone, Error)]
pub enum RtmError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("not connected")]
    NotConnected,
    #[error("connection lost")]
    ConnectionLost,
    #[error("session closed")]
    Closed,
    #[error("timed out waiting for ack")]
    Timeout,
    #[error("correlation id {0} already pending")]
    DuplicateId(u64),
    #[error("rejected: {0}")]
    Rejected(AckError),
    #[error("transport: {0}")]
    Transport(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("internal: {0}")]
    Internal(String),
}

impl RtmError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RtmError::BadRequest(_) => ErrorCode::BadRequest,
            RtmError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            RtmError::NotConnected => ErrorCode::NotConnected,
            RtmError::ConnectionLost => ErrorCode::ConnectionLost,
            RtmError::Closed => ErrorCode::Closed,
            RtmError::Timeout => ErrorCode::Timeout,
            RtmError::DuplicateId(_) => ErrorCode::DuplicateId,
            RtmError::Rejected(_) => ErrorCode::Rejected,
            RtmError::Transport(_) => ErrorCode::Transport,
            RtmError::Decode(_) => ErrorCode::Decode,
            RtmError::Internal(_) => ErrorCode::Internal,
        }
    }
}
