//! Policy constants and runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::RetryConfig;

/// Hours of runtime the balance must cover before provisioning starts.
pub const MIN_COMMITTED_HOURS: f64 = 1.0;

/// Wall-clock limit for a provisioning attempt.
pub const PROVISIONING_TIMEOUT_SECS: u64 = 600;

/// Recommended machines shown for a tier.
pub const MAX_RECOMMENDATIONS: usize = 3;

/// Interval between status polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Interval between timer ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Decision constants consulted by the (pure) reducer and validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// See [`MIN_COMMITTED_HOURS`].
    pub min_committed_hours: f64,
    /// See [`PROVISIONING_TIMEOUT_SECS`].
    pub provisioning_timeout_secs: u64,
    /// See [`MAX_RECOMMENDATIONS`].
    pub max_recommendations: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_committed_hours: MIN_COMMITTED_HOURS,
            provisioning_timeout_secs: PROVISIONING_TIMEOUT_SECS,
            max_recommendations: MAX_RECOMMENDATIONS,
        }
    }
}

/// Runtime configuration for a [`crate::wizard::WizardSession`].
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Decision constants.
    pub policy: Policy,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Interval between timer ticks.
    pub tick_interval: Duration,
    /// Retry policy for gateway reads.
    pub retry: RetryConfig,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            poll_interval: POLL_INTERVAL,
            tick_interval: TICK_INTERVAL,
            retry: RetryConfig::default(),
        }
    }
}

impl WizardConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// - `GPU_WIZARD_MIN_COMMITTED_HOURS`
    /// - `GPU_WIZARD_TIMEOUT_SECS`
    /// - `GPU_WIZARD_POLL_INTERVAL_MS`
    /// - `GPU_WIZARD_TICK_INTERVAL_MS`
    /// - `GPU_WIZARD_MAX_RETRIES`
    /// - `GPU_WIZARD_RETRY_DELAY_MS`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        let policy = Policy {
            min_committed_hours: parsed(&lookup, "GPU_WIZARD_MIN_COMMITTED_HOURS")
                .filter(|h: &f64| *h >= 0.0)
                .unwrap_or(defaults.policy.min_committed_hours),
            provisioning_timeout_secs: parsed(&lookup, "GPU_WIZARD_TIMEOUT_SECS")
                .filter(|s: &u64| *s > 0)
                .unwrap_or(defaults.policy.provisioning_timeout_secs),
            ..defaults.policy
        };

        Self {
            policy,
            poll_interval: parsed(&lookup, "GPU_WIZARD_POLL_INTERVAL_MS")
                .filter(|ms: &u64| *ms > 0)
                .map_or(defaults.poll_interval, Duration::from_millis),
            tick_interval: parsed(&lookup, "GPU_WIZARD_TICK_INTERVAL_MS")
                .filter(|ms: &u64| *ms > 0)
                .map_or(defaults.tick_interval, Duration::from_millis),
            retry: RetryConfig {
                max_attempts: parsed(&lookup, "GPU_WIZARD_MAX_RETRIES")
                    .map_or(defaults.retry.max_attempts, |retries: u32| retries + 1),
                initial_delay: parsed(&lookup, "GPU_WIZARD_RETRY_DELAY_MS")
                    .map_or(defaults.retry.initial_delay, Duration::from_millis),
                ..defaults.retry
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = WizardConfig::default();
        assert_eq!(config.policy.provisioning_timeout_secs, 600);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_env_overrides_and_bad_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GPU_WIZARD_TIMEOUT_SECS", "120"),
            ("GPU_WIZARD_POLL_INTERVAL_MS", "250"),
            ("GPU_WIZARD_MAX_RETRIES", "5"),
            ("GPU_WIZARD_TICK_INTERVAL_MS", "not-a-number"),
            ("GPU_WIZARD_MIN_COMMITTED_HOURS", "-2"),
        ]);
        let config = WizardConfig::from_lookup(|k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.policy.provisioning_timeout_secs, 120);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.tick_interval, TICK_INTERVAL);
        assert!((config.policy.min_committed_hours - MIN_COMMITTED_HOURS).abs() < f64::EPSILON);
    }
}
