//! Client configuration, usually read from an `outbound.toml` file.
//!
//! ```toml
//! timeout = "10s"
//! user_agent = "prayer-sync/2.1"
//!
//! [retry]
//! max_attempts = 4
//! base_delay = "500ms"
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! open_duration = "30s"
//!
//! [rate_limit]
//! max_requests = 60
//! window = "1m"
//!
//! [hosts."api.aladhan.com"]
//! max_requests = 20
//! headers = { "Accept" = "application/json" }
//! ```

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::headers::{deserialize_headers, serialize_headers};
use crate::{CircuitBreakerConfig, HostKey, RateLimitConfig, RetryPolicy};

/// Default timeout for a single transport attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent, `outbound/<version>`
pub const DEFAULT_USER_AGENT: &str = concat!("outbound/", env!("CARGO_PKG_VERSION"));

/// Errors while loading or validating a [`Config`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read config file {}: {source}", .path.display())]
    Io {
        /// Path of the config file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or contains unknown keys
    #[error("Cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values are syntactically fine but unusable
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-host configuration overrides, keyed by host name
/// (`api.example.com`) or by full host key (`https://api.example.com:8443`)
pub type HostConfigs = HashMap<String, HostConfig>;

/// Overrides for a single host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Token bucket capacity for this host
    pub max_requests: Option<u32>,

    /// Token bucket window for this host
    #[serde(default, with = "humantime_serde")]
    pub window: Option<Duration>,

    /// Headers sent with every request to this host
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    #[serde(serialize_with = "serialize_headers")]
    pub headers: HeaderMap,
}

impl HostConfig {
    /// The rate limit for this host, falling back to the global one
    #[must_use]
    pub fn effective_rate_limit(&self, global: &RateLimitConfig) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.max_requests.unwrap_or(global.max_requests),
            window: self.window.unwrap_or(global.window),
        }
    }
}

/// Look up the overrides for a host. A full host key wins over a bare host name.
pub(crate) fn host_config<'a>(hosts: &'a HostConfigs, key: &HostKey) -> Option<&'a HostConfig> {
    hosts
        .get(&key.to_string())
        .or_else(|| hosts.get(key.host()))
}

/// Everything a [`crate::Client`] is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default retry policy
    pub retry: RetryPolicy,

    /// Circuit breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,

    /// Default per-host rate limit
    pub rate_limit: RateLimitConfig,

    /// Timeout for a single transport attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// `User-Agent` header sent with every request
    pub user_agent: String,

    /// Headers sent with every request
    #[serde(deserialize_with = "deserialize_headers")]
    #[serde(serialize_with = "serialize_headers")]
    pub headers: HeaderMap,

    /// Per-host overrides
    pub hosts: HostConfigs,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: HeaderMap::new(),
            hosts: HostConfigs::new(),
        }
    }
}

impl Config {
    /// Load and validate a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, contains
    /// unknown keys or fails [`Config::validate`].
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Check that the values describe a usable client
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !(retry.backoff_multiplier >= 1.0 && retry.backoff_multiplier.is_finite()) {
            return Err(invalid("retry.backoff_multiplier must be a finite number >= 1.0"));
        }
        if retry.base_delay > retry.max_delay {
            return Err(invalid("retry.base_delay must not exceed retry.max_delay"));
        }

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold must be at least 1"));
        }
        if breaker.window.is_zero() {
            return Err(invalid("circuit_breaker.window must not be zero"));
        }
        if breaker.open_duration.is_zero() {
            return Err(invalid("circuit_breaker.open_duration must not be zero"));
        }

        validate_rate_limit("rate_limit", &self.rate_limit)?;
        for (host, config) in &self.hosts {
            let rate_limit = config.effective_rate_limit(&self.rate_limit);
            validate_rate_limit(&format!("hosts.\"{host}\""), &rate_limit)?;
        }

        if self.timeout.is_zero() {
            return Err(invalid("timeout must not be zero"));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_rate_limit(prefix: &str, rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if rate_limit.max_requests == 0 {
        return Err(invalid(&format!("{prefix}.max_requests must be at least 1")));
    }
    if rate_limit.window.is_zero() {
        return Err(invalid(&format!("{prefix}.window must not be zero")));
    }
    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.rate_limit.max_requests, 60);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("outbound/"));
    }

    #[test]
    fn test_full_config() {
        let config: Config = r#"
            timeout = "10s"
            user_agent = "prayer-sync/2.1"
            headers = { "X-Source" = "cron" }

            [retry]
            max_attempts = 4
            base_delay = "500ms"
            max_delay = "5s"
            backoff_multiplier = 3.0
            jitter = false

            [circuit_breaker]
            failure_threshold = 2
            window = "30s"
            open_duration = "1m"

            [rate_limit]
            max_requests = 10
            window = "1s"

            [hosts."api.aladhan.com"]
            max_requests = 2
            headers = { "Accept" = "application/json" }
        "#
        .parse()
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.user_agent, "prayer-sync/2.1");
        assert_eq!(config.headers["x-source"], "cron");
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert!(!config.retry.jitter);
        assert_eq!(config.circuit_breaker.open_duration, Duration::from_secs(60));

        let host = &config.hosts["api.aladhan.com"];
        assert_eq!(host.headers["accept"], "application/json");
        assert_eq!(
            host.effective_rate_limit(&config.rate_limit),
            RateLimitConfig {
                max_requests: 2,
                window: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(matches!(
            "retries = 3".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            "[retry]\nattempts = 3".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        for (toml, key) in [
            ("[retry]\nmax_attempts = 0", "retry.max_attempts"),
            ("[retry]\nbackoff_multiplier = 0.5", "retry.backoff_multiplier"),
            (
                "[retry]\nbase_delay = \"1m\"\nmax_delay = \"1s\"",
                "retry.base_delay",
            ),
            (
                "[circuit_breaker]\nfailure_threshold = 0",
                "circuit_breaker.failure_threshold",
            ),
            ("[rate_limit]\nwindow = \"0s\"", "rate_limit.window"),
            (
                "[hosts.\"example.com\"]\nmax_requests = 0",
                "hosts.\"example.com\".max_requests",
            ),
            ("timeout = \"0s\"", "timeout"),
        ] {
            match toml.parse::<Config>() {
                Err(ConfigError::Invalid(message)) => {
                    assert!(message.starts_with(key), "{message} should mention {key}");
                }
                other => panic!("expected validation error for {toml:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_header_is_a_parse_error() {
        assert!(matches!(
            "headers = { \"bad header\" = \"x\" }".parse::<Config>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nmax_requests = 7").unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.rate_limit.max_requests, 7);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_host_config_lookup() {
        let mut hosts = HostConfigs::new();
        hosts.insert(
            "api.example.com".into(),
            HostConfig {
                max_requests: Some(1),
                ..HostConfig::default()
            },
        );
        hosts.insert(
            "https://api.example.com:8443".into(),
            HostConfig {
                max_requests: Some(2),
                ..HostConfig::default()
            },
        );

        let plain: HostKey = "https://api.example.com/x".parse().unwrap();
        let with_port: HostKey = "https://api.example.com:8443/x".parse().unwrap();
        let other: HostKey = "https://other.example.com".parse().unwrap();

        assert_eq!(host_config(&hosts, &plain).unwrap().max_requests, Some(1));
        assert_eq!(host_config(&hosts, &with_port).unwrap().max_requests, Some(2));
        assert!(host_config(&hosts, &other).is_none());
    }
}
