//! Session config loading for the `rtmlink-client` binary and embedders.
//!
//! The file carries one `session` block: the pre-authenticated websocket
//! address plus ack, connect and keepalive timings, queue sizes, and the
//! reconnect policy. Unknown keys are rejected at every level and `validate`
//! runs before a config is handed out, so a `Session` never starts from a
//! half-understood file.

pub mod schema;

use std::fs;

use rtmlink_core::error::{Result, RtmError};

pub use schema::{ClientConfig, ReconnectSection, SessionConfig};

pub fn load_from_file(path: &str) -> Result<ClientConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RtmError::Internal(format!("read session config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| RtmError::BadRequest(format!("invalid session config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
