//! rtmlink client library entry.
//!
//! Wires the websocket transport, the correlation table, the session state
//! machine and event fan-out into one `Session` handle. Consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod session;
pub mod transport;

pub use correlation::{AckWait, CorrelationTable};
pub use dispatch::{EventConsumer, SessionEvent, Subscription};
pub use session::{ConnectionState, Session};
