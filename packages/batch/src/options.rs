//! Batch run configuration.

use std::str::FromStr;
use std::time::Duration;

/// Default number of units in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of attempts per unit, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry. Doubles on every further retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Tuning knobs of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Maximum number of units or fetches in flight. At least 1.
    pub concurrency: usize,
    /// Attempts per unit before it is reported as failed. At least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub retry_base_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl BatchOptions {
    /// Reads `JSCORE_CONCURRENCY`, `JSCORE_MAX_ATTEMPTS` and
    /// `JSCORE_RETRY_DELAY_MS`, falling back to the defaults for unset or
    /// invalid values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`] with a custom variable lookup.
    #[must_use]
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let delay_ms: Option<u64> = parse_var(&lookup, "JSCORE_RETRY_DELAY_MS");

        Self {
            concurrency: parse_var(&lookup, "JSCORE_CONCURRENCY")
                .unwrap_or(defaults.concurrency)
                .max(1),
            max_attempts: parse_var(&lookup, "JSCORE_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_attempts)
                .max(1),
            retry_base_delay: delay_ms.map_or(defaults.retry_base_delay, Duration::from_millis),
        }
    }

    /// Overrides the concurrency when `value` is set.
    #[must_use]
    pub fn with_concurrency(mut self, value: Option<usize>) -> Self {
        if let Some(value) = value {
            self.concurrency = value.max(1);
        }
        self
    }

    /// Overrides the attempt limit when `value` is set.
    #[must_use]
    pub fn with_max_attempts(mut self, value: Option<u32>) -> Self {
        if let Some(value) = value {
            self.max_attempts = value.max(1);
        }
        self
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << shift)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    raw.trim().parse().map_or_else(
        |_| {
            log::warn!("Ignoring invalid {name}={raw:?}");
            None
        },
        Some,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(BatchOptions::from_vars(vars(&[])), BatchOptions::default());
    }

    #[test]
    fn reads_variables() {
        let options = BatchOptions::from_vars(vars(&[
            ("JSCORE_CONCURRENCY", "16"),
            ("JSCORE_MAX_ATTEMPTS", " 5 "),
            ("JSCORE_RETRY_DELAY_MS", "20"),
        ]));
        assert_eq!(options.concurrency, 16);
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.retry_base_delay, Duration::from_millis(20));
    }

    #[test]
    fn invalid_and_zero_values_are_ignored_or_clamped() {
        let options = BatchOptions::from_vars(vars(&[
            ("JSCORE_CONCURRENCY", "0"),
            ("JSCORE_MAX_ATTEMPTS", "lots"),
        ]));
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn cli_overrides_win() {
        let options = BatchOptions::default()
            .with_concurrency(Some(8))
            .with_max_attempts(None);
        assert_eq!(options.concurrency, 8);
        assert_eq!(options.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn backoff_doubles() {
        let options = BatchOptions::default();
        assert_eq!(options.backoff(1), Duration::from_millis(500));
        assert_eq!(options.backoff(2), Duration::from_secs(1));
        assert_eq!(options.backoff(3), Duration::from_secs(2));
    }
}
