//! Wire protocol of the real-time channel.
//!
//! - `event`: server-pushed events, one variant per discriminator plus an
//!   `Unknown` fallback that keeps the raw payload.
//! - `ack`: replies to client-sent messages, correlated by `reply_to`.
//! - `outbound`: client-built message objects, stamped with an `id` on send.
//!
//! Variable-shape fields are held as `RawValue` so receivers decode them
//! lazily, only when they care.

pub mod ack;
pub mod event;
pub mod outbound;
