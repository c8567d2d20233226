//! Per-host admission control.
//!
//! Each host owns a fixed-window token bucket. The bucket grants
//! [`RateLimitConfig::max_requests`] permits per [`RateLimitConfig::window`]
//! and is refilled lazily: the first admission check after the window has
//! elapsed starts a new window with a full bucket. Rejected calls are never
//! queued or delayed; it is up to the caller to back off.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default number of requests per host and window
const DEFAULT_MAX_REQUESTS: u32 = 60;

/// Default length of a rate limit window
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Token bucket configuration that applies to every host unless overridden
/// in a [`crate::HostConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Bucket capacity, i.e. admitted requests per window
    pub max_requests: u32,

    /// Refill period of the bucket
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Fixed-window token bucket for a single host.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    config: RateLimitConfig,
    tokens: u32,
    window_started_at: Instant,
}

impl TokenBucket {
    pub(crate) const fn new(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            config,
            tokens: config.max_requests,
            window_started_at: now,
        }
    }

    /// Take one permit.
    ///
    /// On rejection, returns how long until the current window ends and the
    /// bucket is refilled.
    pub(crate) fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.window_started_at);
        if elapsed >= self.config.window {
            self.window_started_at = now;
            self.tokens = self.config.max_requests;
        }

        if self.tokens == 0 {
            let elapsed = now.saturating_duration_since(self.window_started_at);
            return Err(self.config.window.saturating_sub(elapsed));
        }

        self.tokens -= 1;
        Ok(())
    }

    /// Remaining permits in the current window, as of the last check
    pub(crate) const fn tokens(&self) -> u32 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(max_requests: u32, window: Duration) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window,
        }
    }

    #[test]
    fn test_default_rate_limit_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.max_requests, 60);
        assert_eq!(config.window, Duration::from_secs(60));
    }

    #[test]
    fn test_exact_capacity_per_window() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(config(3, Duration::from_secs(10)), start);

        for _ in 0..3 {
            assert!(bucket.try_consume(start).is_ok());
        }
        assert_eq!(bucket.tokens(), 0);

        let retry_in = bucket
            .try_consume(start + Duration::from_secs(4))
            .unwrap_err();
        assert_eq!(retry_in, Duration::from_secs(6));
    }

    #[test]
    fn test_lazy_full_refill_after_window() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(config(2, Duration::from_secs(10)), start);
        assert!(bucket.try_consume(start).is_ok());
        assert!(bucket.try_consume(start).is_ok());
        assert!(bucket.try_consume(start + Duration::from_secs(9)).is_err());

        // The new window starts at the first check after expiry, not at the
        // end of the previous window.
        let later = start + Duration::from_secs(25);
        assert!(bucket.try_consume(later).is_ok());
        assert_eq!(bucket.tokens(), 1);
        assert!(bucket.try_consume(later + Duration::from_secs(9)).is_ok());
        assert!(bucket.try_consume(later + Duration::from_secs(9)).is_err());
        assert!(bucket.try_consume(later + Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = config(15, Duration::from_millis(200));

        let toml = toml::to_string(&config).unwrap();
        let deserialized: RateLimitConfig = toml::from_str(&toml).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_partial_toml() {
        let config: RateLimitConfig = toml::from_str("max_requests = 5").unwrap();
        assert_eq!(config.max_requests, 5);
        assert_eq!(config.window, DEFAULT_WINDOW);
    }
}
