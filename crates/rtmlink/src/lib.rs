//! Top-level facade crate for rtmlink.
//!
//! Re-exports core types and the client library so users can depend on a single crate.

pub mod core {
    pub use rtmlink_core::*;
}

pub mod client {
    pub use rtmlink_client::*;
}
