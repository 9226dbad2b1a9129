//! Exponential reconnection backoff.
//!
//! `delay(n) = min(base^n, cap)` seconds for attempt `n` (1-based), so the
//! default policy waits 2s, 4s, 8s, 16s, 32s, 32s, ...

use crate::domain::settings::ConnectionSettings;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_secs: u64,
    pub cap_secs: u64,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_secs: 2,
            cap_secs: 32,
            max_attempts: 5,
        }
    }
}

impl From<&ConnectionSettings> for Backoff {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            base_secs: settings.backoff_base_secs,
            cap_secs: settings.backoff_cap_secs,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

impl Backoff {
    /// Delay to wait before attempt `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self
            .base_secs
            .checked_pow(attempt)
            .unwrap_or(u64::MAX)
            .min(self.cap_secs);
        Duration::from_secs(secs)
    }

    /// Delays for every attempt of one reconnection sequence
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(move |attempt| self.delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn test_default_sequence() {
        let delays: Vec<_> = Backoff::default().delays().collect();
        assert_eq!(delays, secs(&[2, 4, 8, 16, 32]));
    }

    #[test]
    fn test_cap_holds_past_limit() {
        let backoff = Backoff {
            max_attempts: 8,
            ..Default::default()
        };
        let delays: Vec<_> = backoff.delays().collect();
        assert_eq!(delays, secs(&[2, 4, 8, 16, 32, 32, 32, 32]));
    }

    #[test]
    fn test_overflow_saturates_to_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(200), Duration::from_secs(32));
    }

    #[test]
    fn test_from_settings() {
        let settings = ConnectionSettings {
            backoff_base_secs: 3,
            backoff_cap_secs: 10,
            max_reconnect_attempts: 3,
            ..Default::default()
        };
        let delays: Vec<_> = Backoff::from(&settings).delays().collect();
        assert_eq!(delays, secs(&[3, 9, 10]));
    }
}
