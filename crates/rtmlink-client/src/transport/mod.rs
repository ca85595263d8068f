//! Frame transport boundary.
//!
//! The session only needs discrete UTF-8 text frames in both directions, so
//! the socket library hides behind three small traits. `ws` implements them
//! over `tokio-tungstenite`; tests plug in an in-memory pair.

pub mod ws;

use async_trait::async_trait;

use rtmlink_core::error::Result;

pub use ws::WsConnector;

/// Write half of a live connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a live connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame, or `Ok(None)` once the peer has closed.
    ///
    /// Must be cancel-safe: the session races it against other work.
    async fn recv(&mut self) -> Result<Option<String>>;
}

/// Both halves, independently usable from different tasks.
pub type Connection = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Opens connections. One call per connection generation.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Connection>;
}
