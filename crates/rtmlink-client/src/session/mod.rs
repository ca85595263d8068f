//! Session lifecycle: connect, serve, reconnect, close.

mod backoff;
mod manager;
mod state;

pub use backoff::Backoff;
pub use manager::Session;
pub use state::ConnectionState;
