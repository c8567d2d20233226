use serde::Serialize;
use std::time::Duration;

use crate::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// Read-only snapshot of a client's configured thresholds and defaults.
///
/// Live per-host counters are available separately through
/// [`crate::Client::all_host_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStats {
    /// Default retry policy
    pub retry: RetryPolicy,
    /// Circuit breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
    /// Default per-host rate limit
    pub rate_limit: RateLimitConfig,
    /// Default timeout per attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
    /// Hosts contacted so far
    pub tracked_hosts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_serialize_stats() {
        let stats = ClientStats {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeout: Duration::from_secs(30),
            user_agent: "outbound/0.1.0".into(),
            tracked_hosts: 2,
        };

        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({
                "retry": {
                    "max_attempts": 3,
                    "base_delay": "1s",
                    "max_delay": "30s",
                    "backoff_multiplier": 2.0,
                    "jitter": true
                },
                "circuit_breaker": {
                    "failure_threshold": 5,
                    "window": "1m",
                    "open_duration": "30s"
                },
                "rate_limit": {
                    "max_requests": 60,
                    "window": "1m"
                },
                "timeout": "30s",
                "user_agent": "outbound/0.1.0",
                "tracked_hosts": 2
            })
        );
    }
}
