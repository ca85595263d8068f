use std::time::Duration;

use rtmlink_core::error::DecodeError;
use rtmlink_core::protocol::event::RtmEvent;

/// What subscribers receive, in frame-arrival order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A decoded server event (including `Unknown`).
    Event(RtmEvent),
    /// A frame that could not be classified. The read loop carried on.
    DecodeError(DecodeError),
    /// A connection attempt is starting.
    Connecting { attempt: u32, url: String },
    /// Handshake done; `generation` identifies this live connection.
    Connected { generation: u64, url: String },
    /// The connection of `generation` ended.
    Disconnected { generation: u64, reason: String },
    /// The next connection attempt will start after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
}

impl SessionEvent {
    /// The inner server event, if this is one.
    pub fn as_event(&self) -> Option<&RtmEvent> {
        match self {
            SessionEvent::Event(ev) => Some(ev),
            _ => None,
        }
    }
}
