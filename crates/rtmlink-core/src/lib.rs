//! rtmlink core: transport-agnostic wire types, event classification, errors.
//!
//! This crate defines the inbound event vocabulary of the real-time channel,
//! the acknowledgment shape, outbound message encoding, and the classifier
//! that turns raw text frames into typed values. It carries no runtime or
//! transport dependencies so it can be reused by tools that only need to
//! decode captured traffic.
//!
//! # Panic-free
//! `unwrap`, `expect` and `panic!` are compile-denied here. Every fallible
//! path surfaces as `RtmError`/`DecodeError` so a hostile or corrupt frame
//! can never take the read loop down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod classify;
pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{DecodeError, ErrorCode, Result, RtmError};

pub use classify::{Classifier, DecodeFn, EventRegistry, Inbound};
pub use protocol::ack::{AckError, AckMessage, Delivered};
pub use protocol::event::RtmEvent;
pub use protocol::outbound::OutgoingMessage;
