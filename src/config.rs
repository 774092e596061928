//! Configuration types for taskwatch
//!
//! All durations are (de)serialized as integer milliseconds so that a policy can
//! be written as `{"timeout": 10000, "max_retries": 3, "retry_delay": 1000}`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for one logical kind of request
///
/// A policy is built once per operation type (reads, writes, polling) and never
/// mutated afterwards. The delay before retry `k` (1-indexed) is
/// `retry_delay * k`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Wall-clock budget for a single attempt (default: 10 seconds)
    #[serde(default = "default_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// Number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for linear backoff (default: 1 second)
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,

    /// Scale each delay by a random factor in `[1, 2)` (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy without jitter
    #[must_use]
    pub fn new(timeout: Duration, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            retry_delay,
            jitter: false,
        }
    }

    /// Policy for idempotent reads: 10s budget, 3 retries, 1s base delay
    #[must_use]
    pub fn reads() -> Self {
        Self::default()
    }

    /// Policy for writes: longer budget, a single retry, 2s base delay
    #[must_use]
    pub fn writes() -> Self {
        Self::new(Duration::from_secs(30), 1, Duration::from_secs(2))
    }

    /// Policy for status polls: short budget and no retries, the next tick is the retry
    #[must_use]
    pub fn polling() -> Self {
        Self::new(Duration::from_secs(5), 0, Duration::ZERO)
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Reject policies that can never succeed
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::config("timeout", "per-attempt timeout must be > 0"));
        }
        Ok(())
    }
}

/// Task progress tracker configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Interval between poll calls (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// Upper bound for a single poll call (None = same as `poll_interval`)
    #[serde(default, with = "optional_duration_ms_serde")]
    pub poll_timeout: Option<Duration>,

    /// Silence after which progress is simulated (default: 5 seconds)
    #[serde(default = "default_fallback_duration", with = "duration_ms_serde")]
    pub fallback_duration: Duration,

    /// Interval between simulated progress ticks (default: 1 second)
    #[serde(default = "default_simulated_tick", with = "duration_ms_serde")]
    pub simulated_tick: Duration,

    /// Maximum history entries kept, oldest evicted first (default: 100)
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            poll_timeout: None,
            fallback_duration: default_fallback_duration(),
            simulated_tick: default_simulated_tick(),
            max_history: default_max_history(),
        }
    }
}

impl TrackerConfig {
    /// Effective per-poll timeout
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout.unwrap_or(self.poll_interval)
    }

    /// Reject configurations that would spin or never record history
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll_interval", "must be > 0"));
        }
        if self.poll_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("poll_timeout", "must be > 0 when set"));
        }
        if self.fallback_duration.is_zero() {
            return Err(Error::config("fallback_duration", "must be > 0"));
        }
        if self.simulated_tick.is_zero() {
            return Err(Error::config("simulated_tick", "must be > 0"));
        }
        if self.max_history == 0 {
            return Err(Error::config("max_history", "must be at least 1"));
        }
        Ok(())
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_fallback_duration() -> Duration {
    Duration::from_secs(5)
}

fn default_simulated_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_max_history() -> usize {
    100
}

mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

mod optional_duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_deserializes_millisecond_fields() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"timeout": 2500, "max_retries": 2, "retry_delay": 300}"#)
                .unwrap();
        assert_eq!(policy.timeout, Duration::from_millis(2500));
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.retry_delay, Duration::from_millis(300));
        assert!(!policy.jitter);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn retry_policy_defaults_fill_missing_fields() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn presets_are_distinct() {
        assert_eq!(RetryPolicy::reads().max_retries, 3);
        assert_eq!(RetryPolicy::writes().max_retries, 1);
        assert_eq!(RetryPolicy::polling().max_retries, 0);
        assert!(RetryPolicy::writes().timeout > RetryPolicy::reads().timeout);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let policy = RetryPolicy::new(Duration::ZERO, 1, Duration::from_millis(10));
        match policy.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("timeout")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn max_attempts_saturates() {
        let policy = RetryPolicy::new(Duration::from_secs(1), u32::MAX, Duration::ZERO);
        assert_eq!(policy.max_attempts(), u32::MAX);
    }

    #[test]
    fn tracker_config_roundtrips_through_json() {
        let config = TrackerConfig {
            poll_interval: Duration::from_millis(1000),
            poll_timeout: Some(Duration::from_millis(750)),
            fallback_duration: Duration::from_millis(5000),
            simulated_tick: Duration::from_millis(500),
            max_history: 10,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["poll_interval"], 1000);
        assert_eq!(json["poll_timeout"], 750);
        let back: TrackerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn poll_timeout_defaults_to_interval() {
        let config = TrackerConfig::default();
        assert_eq!(config.poll_timeout(), config.poll_interval);
    }

    #[test]
    fn tracker_config_validation() {
        assert!(TrackerConfig::default().validate().is_ok());

        let zero_history = TrackerConfig {
            max_history: 0,
            ..Default::default()
        };
        assert!(zero_history.validate().is_err());

        let zero_poll = TrackerConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_poll.validate().is_err());

        let zero_tick = TrackerConfig {
            simulated_tick: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_tick.validate().is_err());
    }
}
