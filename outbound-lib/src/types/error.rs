use http::StatusCode;
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::{ConfigError, HostKey};

/// The transient failure behind a retryable error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportFailure {
    /// The connection was reset, aborted or closed mid-response
    ConnectionReset,
    /// Connecting or waiting for the response took longer than the timeout
    Timeout,
    /// The host could not be resolved or refused the connection
    Connect,
    /// The upstream answered with a 5xx status
    ServerError,
    /// The upstream answered with 429 Too Many Requests
    TooManyRequests,
}

/// Coarse classification of an [`ErrorKind`], for callers that only need to
/// know how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected before any network activity. Back off independently.
    AdmissionDenied,
    /// A transient failure persisted through every attempt
    RetriesExhausted,
    /// Retrying the same request cannot succeed
    NonRetryable,
}

/// Possible errors when issuing requests through the [`crate::Client`]
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The host's token bucket is empty for the current window
    #[error("Rate limit exceeded for {host}, window refills in {}ms", .retry_in.as_millis())]
    RateLimitExceeded {
        /// The host that was not admitted
        host: HostKey,
        /// Time until the bucket is refilled
        retry_in: Duration,
    },

    /// The host's circuit is open
    #[error("Circuit open for {host}, next trial in {}ms", .retry_in.as_millis())]
    CircuitOpen {
        /// The host that was not admitted
        host: HostKey,
        /// Time until a trial request may be admitted
        retry_in: Duration,
    },

    /// A transient failure that persisted through all attempts
    #[error("Request to {host} failed after {attempts} attempt(s) ({failure}{}): {message}", fmt_status(.status))]
    RetryableTransport {
        /// The upstream host
        host: HostKey,
        /// Status of the last response, if one was received
        status: Option<StatusCode>,
        /// What went wrong on the last attempt
        failure: TransportFailure,
        /// Transport attempts made
        attempts: u32,
        /// Description of the last failure
        message: String,
    },

    /// A failure that is not worth retrying, e.g. a 4xx response
    #[error("Request to {host} failed{}: {message}", fmt_status(.status))]
    NonRetryableClient {
        /// The upstream host
        host: HostKey,
        /// Status of the response, if one was received
        status: Option<StatusCode>,
        /// Description of the failure
        message: String,
    },

    /// The given string can not be parsed into a valid URL
    #[error("Cannot parse `{0}` as URL: {1}")]
    InvalidUrl(String, #[source] url::ParseError),

    /// An URL without a host was given
    #[error("URL is missing a host: {0}")]
    MissingHost(Url),

    /// The given header could not be parsed.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The request body could not be serialized
    #[error("Cannot serialize request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The underlying HTTP client could not be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// The client configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn fmt_status(status: &Option<StatusCode>) -> String {
    status.map_or_else(String::new, |s| format!(" with status {s}"))
}

impl ErrorKind {
    /// How the caller should react to this error
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimitExceeded { .. } | Self::CircuitOpen { .. } => {
                ErrorCategory::AdmissionDenied
            }
            Self::RetryableTransport { .. } => ErrorCategory::RetriesExhausted,
            _ => ErrorCategory::NonRetryable,
        }
    }

    /// Returns `true` if the request never reached the network
    #[must_use]
    pub const fn is_admission_denied(&self) -> bool {
        matches!(self.category(), ErrorCategory::AdmissionDenied)
    }

    /// The upstream host this error relates to, if any
    #[must_use]
    pub const fn host(&self) -> Option<&HostKey> {
        match self {
            Self::RateLimitExceeded { host, .. }
            | Self::CircuitOpen { host, .. }
            | Self::RetryableTransport { host, .. }
            | Self::NonRetryableClient { host, .. } => Some(host),
            _ => None,
        }
    }

    /// The HTTP status of the last response, if one was received
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RetryableTransport { status, .. } | Self::NonRetryableClient { status, .. } => {
                *status
            }
            _ => None,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn host() -> HostKey {
        "https://api.example.com".parse().unwrap()
    }

    #[test]
    fn test_categories() {
        let rate_limited = ErrorKind::RateLimitExceeded {
            host: host(),
            retry_in: Duration::from_secs(1),
        };
        assert_eq!(rate_limited.category(), ErrorCategory::AdmissionDenied);
        assert!(rate_limited.is_admission_denied());

        let exhausted = ErrorKind::RetryableTransport {
            host: host(),
            status: Some(StatusCode::BAD_GATEWAY),
            failure: TransportFailure::ServerError,
            attempts: 3,
            message: "Bad Gateway".into(),
        };
        assert_eq!(exhausted.category(), ErrorCategory::RetriesExhausted);
        assert_eq!(exhausted.status(), Some(StatusCode::BAD_GATEWAY));
        assert!(!exhausted.is_admission_denied());

        let missing = ErrorKind::MissingHost(Url::parse("data:text/plain,hi").unwrap());
        assert_eq!(missing.category(), ErrorCategory::NonRetryable);
        assert_eq!(missing.host(), None);
    }

    #[test]
    fn test_display() {
        let error = ErrorKind::CircuitOpen {
            host: host(),
            retry_in: Duration::from_millis(1500),
        };
        assert_eq!(
            error.to_string(),
            "Circuit open for https://api.example.com, next trial in 1500ms"
        );

        let error = ErrorKind::NonRetryableClient {
            host: host(),
            status: Some(StatusCode::NOT_FOUND),
            message: "no such city".into(),
        };
        assert_eq!(
            error.to_string(),
            "Request to https://api.example.com failed with status 404 Not Found: no such city"
        );

        let error = ErrorKind::RetryableTransport {
            host: host(),
            status: None,
            failure: TransportFailure::Timeout,
            attempts: 2,
            message: "operation timed out".into(),
        };
        assert_eq!(
            error.to_string(),
            "Request to https://api.example.com failed after 2 attempt(s) (timeout): operation timed out"
        );
    }
}
