//! Retry policy and exponential backoff.
//!
//! The delay after the `n`-th failed attempt is
//! `min(base_delay * backoff_multiplier^(n - 1), max_delay)`, computed in
//! whole milliseconds. With jitter enabled the delay is scaled by a uniform
//! factor in `[0.75, 1.25]` and clamped to `max_delay` again.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Default number of attempts per call, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay after the first failed attempt, 1 second.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default upper bound for a single backoff delay, 30 seconds.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Default growth factor between consecutive delays.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Lower bound of the jitter factor
const JITTER_MIN: f64 = 0.75;
/// Upper bound of the jitter factor
const JITTER_MAX: f64 = 1.25;

/// How often and how patiently a call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Upper bound on transport attempts per call
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Cap for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Randomize delays by up to ±25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given failed attempt (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.base_delay.as_millis() as f64;
        #[allow(clippy::cast_precision_loss)]
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = (base_ms * self.backoff_multiplier.powi(exponent)).min(max_ms);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Delay to wait after the given failed attempt, jittered if enabled.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
            self.scale(delay, factor)
        } else {
            delay
        }
    }

    /// Scale a delay by `factor`, keeping whole milliseconds and the cap.
    fn scale(&self, delay: Duration, factor: f64) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = delay.as_millis() as f64 * factor;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(scaled.round() as u64).min(self.max_delay)
    }
}

/// Per-call changes to the client's default [`RetryPolicy`].
///
/// Unset fields keep the client default.
#[derive(TypedBuilder, Debug, Clone, Copy, Default, PartialEq)]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct RetryOverrides {
    /// See [`RetryPolicy::max_attempts`]
    pub max_attempts: Option<u32>,
    /// See [`RetryPolicy::base_delay`]
    pub base_delay: Option<Duration>,
    /// See [`RetryPolicy::max_delay`]
    pub max_delay: Option<Duration>,
    /// See [`RetryPolicy::backoff_multiplier`]
    pub backoff_multiplier: Option<f64>,
    /// See [`RetryPolicy::jitter`]
    pub jitter: Option<bool>,
}

impl RetryOverrides {
    /// Build the policy for one call on top of `defaults`.
    ///
    /// At least one attempt is always made.
    #[must_use]
    pub fn apply(&self, defaults: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            base_delay: self.base_delay.unwrap_or(defaults.base_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            backoff_multiplier: self
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[rstest]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 800)]
    #[case(5, 1000)]
    #[case(40, 1000)]
    fn test_backoff_curve(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(
            policy(100, 1000).backoff(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = policy(250, 30_000);
        let delays: Vec<_> = (1..=64).map(|attempt| policy.backoff(attempt)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[test]
    fn test_fractional_multiplier_rounds_to_millis() {
        let policy = RetryPolicy {
            backoff_multiplier: 1.5,
            ..policy(100, 10_000)
        };
        assert_eq!(policy.backoff(2), Duration::from_millis(150));
        assert_eq!(policy.backoff(3), Duration::from_millis(225));
        assert_eq!(policy.backoff(4), Duration::from_millis(338));
    }

    #[test]
    fn test_jitter_stays_within_band() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy(100, 30_000)
        };
        for _ in 0..200 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(150), "{delay:?}");
            assert!(delay <= Duration::from_millis(250), "{delay:?}");
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let policy = policy(1000, 1000);
        assert_eq!(
            policy.scale(Duration::from_millis(1000), JITTER_MAX),
            Duration::from_millis(1000)
        );
        assert_eq!(
            policy.scale(Duration::from_millis(1000), JITTER_MIN),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_overrides() {
        let defaults = RetryPolicy::default();
        assert_eq!(RetryOverrides::default().apply(&defaults), defaults);

        let overrides = RetryOverrides::builder()
            .max_attempts(5)
            .base_delay(Duration::from_millis(10))
            .jitter(false)
            .build();
        let policy = overrides.apply(&defaults);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, DEFAULT_MAX_DELAY);
        assert!(!policy.jitter);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let overrides = RetryOverrides::builder().max_attempts(0).build();
        assert_eq!(overrides.apply(&RetryPolicy::default()).max_attempts, 1);
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy =
            toml::from_str("max_attempts = 4\nbase_delay = \"250ms\"\njitter = false").unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, DEFAULT_MAX_DELAY);
        assert!(!policy.jitter);
    }
}
