//! Event fan-out module exports.
//!
//! Re-exports the dispatcher, subscription handles and the consumer trait so
//! downstream code can depend on this module directly.

pub mod dispatcher;
pub mod event;

pub use dispatcher::{EventConsumer, EventDispatcher, Subscription, SubscriptionId};
pub use event::SessionEvent;
