use std::time::Duration;

use serde::Deserialize;
use rtmlink_core::error::{Result, RtmError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RtmError::UnsupportedVersion);
        }
        self.session.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Pre-authenticated websocket address (`ws://` or `wss://`).
    pub url: String,

    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Keepalive ping period; 0 disables pings.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Outbound frames queued for the writer task.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Events buffered per subscriber before that subscriber starts dropping.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    #[serde(default)]
    pub reconnect: ReconnectSection,
}

impl SessionConfig {
    /// Config with defaults for everything but the address.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ack_timeout_ms: default_ack_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            outbound_buffer: default_outbound_buffer(),
            event_buffer: default_event_buffer(),
            reconnect: ReconnectSection::default(),
        }
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectSection) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn with_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.ack_timeout_ms = ms;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(RtmError::BadRequest(
                "session.url must start with ws:// or wss://".into(),
            ));
        }
        if !(100..=600000).contains(&self.ack_timeout_ms) {
            return Err(RtmError::BadRequest(
                "session.ack_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if !(100..=120000).contains(&self.connect_timeout_ms) {
            return Err(RtmError::BadRequest(
                "session.connect_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if self.ping_interval_ms != 0 && !(1000..=600000).contains(&self.ping_interval_ms) {
            return Err(RtmError::BadRequest(
                "session.ping_interval_ms must be 0 or between 1000 and 600000".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_buffer) {
            return Err(RtmError::BadRequest(
                "session.outbound_buffer must be between 1 and 65536".into(),
            ));
        }
        if !(1..=65536).contains(&self.event_buffer) {
            return Err(RtmError::BadRequest(
                "session.event_buffer must be between 1 and 65536".into(),
            ));
        }

        self.reconnect.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectSection {
    #[serde(default = "default_reconnect_enabled")]
    pub enabled: bool,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive failed connects before giving up; 0 retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            enabled: default_reconnect_enabled(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: 0,
        }
    }
}

impl ReconnectSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=60000).contains(&self.initial_delay_ms) {
            return Err(RtmError::BadRequest(
                "session.reconnect.initial_delay_ms must be between 1 and 60000".into(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms || self.max_delay_ms > 600000 {
            return Err(RtmError::BadRequest(
                "session.reconnect.max_delay_ms must be between initial_delay_ms and 600000".into(),
            ));
        }
        Ok(())
    }
}

fn default_ack_timeout_ms() -> u64 {
    10000
}
fn default_connect_timeout_ms() -> u64 {
    10000
}
fn default_ping_interval_ms() -> u64 {
    30000
}
fn default_outbound_buffer() -> usize {
    256
}
fn default_event_buffer() -> usize {
    1024
}
fn default_reconnect_enabled() -> bool {
    true
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30000
}
