use std::time::Duration;

use crate::config::ReconnectSection;

/// Exponential reconnect delay, capped.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
}

impl Backoff {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay before attempt number `attempt` (0 = first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let calculated = self.initial_delay_ms.saturating_mul(1_u64 << shift);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }
}

impl From<&ReconnectSection> for Backoff {
    fn from(cfg: &ReconnectSection) -> Self {
        Self::new(cfg.initial_delay_ms, cfg.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_initial_delay() {
        let b = Backoff::new(250, 8_000);
        assert_eq!(b.delay_for_attempt(0), Duration::from_millis(250));
    }

    #[test]
    fn doubles_per_attempt() {
        let b = Backoff::new(100, 10_000);
        assert_eq!(b.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(b.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn caps_at_max() {
        let b = Backoff::new(1_000, 4_000);
        assert_eq!(b.delay_for_attempt(5), Duration::from_millis(4_000));
        assert_eq!(b.delay_for_attempt(u32::MAX), Duration::from_millis(4_000));
    }
}
