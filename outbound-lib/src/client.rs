//! Outbound request handling.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` sends requests through the per-host rate limiter, circuit breaker
//! and retry loop. `ClientBuilder` exposes a finer level of granularity for
//! building a `Client`.
//!
//! For convenience, the free functions [`get`] and [`post`] are provided for
//! ad-hoc requests with default settings.
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{self, CONTENT_TYPE, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use serde::Serialize;
use tokio::time::sleep;
use typed_builder::TypedBuilder;
use url::Url;

use crate::config::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::headers::retry_after;
use crate::host::Host;
use crate::pool::HostPool;
use crate::retryable::RetryExt;
use crate::{
    CircuitBreakerConfig, CircuitState, ClientStats, Clock, Config, ErrorKind, HostConfigs,
    HostKey, HostStats, HostStatsMap, RateLimitConfig, RequestOptions, Result, RetryPolicy,
    SystemClock, TransportFailure, UpstreamResponse,
};

/// Longest excerpt of an error response body kept in error messages
const MAX_ERROR_BODY_LEN: usize = 256;

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Default retry policy, overridable per call with [`RequestOptions`].
    retry: RetryPolicy,
    /// Circuit breaker thresholds, shared by all hosts.
    circuit_breaker: CircuitBreakerConfig,
    /// Default token bucket for every host.
    rate_limit: RateLimitConfig,
    /// Timeout for a single transport attempt.
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
    /// User-agent sent with every request.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,
    /// Sets the default [headers] for every request.
    ///
    /// [headers]: https://docs.rs/http/latest/http/header/struct.HeaderName.html
    custom_headers: HeaderMap,
    /// Overrides for individual hosts, keyed by host name.
    hosts: HostConfigs,
    /// Time source for windows and cooldowns.
    ///
    /// Tests inject a [`crate::ManualClock`] here.
    #[builder(default_code = "Arc::new(SystemClock)", setter(!into))]
    clock: Arc<dyn Clock>,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Start from a loaded [`Config`]
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self::builder()
            .retry(config.retry)
            .circuit_breaker(config.circuit_breaker)
            .rate_limit(config.rate_limit)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .custom_headers(config.headers)
            .hosts(config.hosts)
            .build()
    }

    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The configuration is invalid, see [`Config::validate`].
    /// - The user-agent is invalid.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let Self {
            retry,
            circuit_breaker,
            rate_limit,
            timeout,
            user_agent,
            custom_headers,
            hosts,
            clock,
        } = self;

        let config = Config {
            retry,
            circuit_breaker,
            rate_limit,
            timeout,
            user_agent,
            headers: custom_headers,
            hosts,
        };
        config.validate()?;

        let mut headers = config.headers;
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(ErrorKind::InvalidHeader)?,
        );

        let reqwest_client = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .build()
            .map_err(ErrorKind::BuildRequestClient)?;

        let pool = HostPool::new(
            config.rate_limit,
            config.circuit_breaker,
            config.hosts,
            clock,
        );

        Ok(Client {
            reqwest_client,
            pool,
            retry: config.retry,
            circuit_breaker: config.circuit_breaker,
            rate_limit: config.rate_limit,
            timeout: config.timeout,
            user_agent: config.user_agent,
        })
    }
}

/// Sends requests to upstream hosts with rate limiting, circuit breaking and
/// retries.
///
/// Cloning is cheap: clones share the connection pool and all per-host state.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration options.
#[derive(Debug, Clone)]
pub struct Client {
    /// Underlying `reqwest` client instance that handles the HTTP requests.
    reqwest_client: reqwest::Client,
    /// Per-host rate limiter and circuit breaker state.
    pool: HostPool,
    /// Default retry policy.
    retry: RetryPolicy,
    circuit_breaker: CircuitBreakerConfig,
    rate_limit: RateLimitConfig,
    /// Default timeout per attempt.
    timeout: Duration,
    user_agent: String,
}

/// Why a single attempt did not produce a usable response
#[derive(Debug)]
struct AttemptFailure {
    /// `None` if retrying cannot help
    reason: Option<TransportFailure>,
    status: Option<StatusCode>,
    retry_after: Option<Duration>,
    message: String,
}

impl AttemptFailure {
    fn from_transport(error: &reqwest::Error) -> Self {
        Self {
            reason: error.retry_reason(),
            status: error.status(),
            retry_after: None,
            message: error.to_string(),
        }
    }
}

impl Client {
    /// Send a GET request.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the URL is invalid, the host is not admitted, or
    /// the request failed, see [`ErrorKind`].
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<UpstreamResponse> {
        self.execute(Method::GET, url, None, options).await
    }

    /// Send a POST request with the given body.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the URL is invalid, the host is not admitted, or
    /// the request failed, see [`ErrorKind`].
    pub async fn post(
        &self,
        url: &str,
        body: impl Into<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<UpstreamResponse> {
        self.execute(Method::POST, url, Some(body.into()), options)
            .await
    }

    /// Send a POST request with a JSON body.
    ///
    /// Sets `Content-Type: application/json` unless the options already carry
    /// a content type.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the body cannot be serialized, or for the same
    /// reasons as [`Client::post`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        mut options: RequestOptions,
    ) -> Result<UpstreamResponse> {
        let body = serde_json::to_vec(body)?;
        if !options.headers.contains_key(CONTENT_TYPE) {
            options
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.post(url, body, options).await
    }

    /// The configured thresholds and defaults
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            retry: self.retry,
            circuit_breaker: self.circuit_breaker,
            rate_limit: self.rate_limit,
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
            tracked_hosts: self.pool.active_host_count(),
        }
    }

    /// Live counters for a host, empty if it was never contacted
    #[must_use]
    pub fn host_stats(&self, host: &HostKey) -> HostStats {
        self.pool.host_stats(host)
    }

    /// Live counters for every host contacted so far
    #[must_use]
    pub fn all_host_stats(&self) -> HostStatsMap {
        self.pool.all_host_stats()
    }

    /// Circuit state of a host, `None` if it was never contacted
    #[must_use]
    pub fn circuit_state(&self, host: &HostKey) -> Option<CircuitState> {
        self.pool.circuit_state(host)
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<UpstreamResponse> {
        let url = Url::parse(url).map_err(|e| ErrorKind::InvalidUrl(url.to_string(), e))?;
        let host = self.pool.get_or_create_host(&url)?;
        let policy = options.retry.apply(&self.retry);
        let timeout = options.timeout.unwrap_or(self.timeout);

        // Host headers first, per-call headers win
        let mut headers = host.headers().clone();
        for (name, value) in &options.headers {
            headers.insert(name, value.clone());
        }

        host.admit(self.pool.clock().now())?;

        let mut attempt = 1;
        loop {
            let failure = match self
                .attempt(&host, &method, &url, body.as_ref(), &headers, timeout)
                .await
            {
                Ok(mut response) => {
                    response.attempts = attempt;
                    host.record_success();
                    return Ok(response);
                }
                Err(failure) => failure,
            };

            let Some(reason) = failure.reason else {
                host.record_failure(self.pool.clock().now());
                return Err(ErrorKind::NonRetryableClient {
                    host: host.key.clone(),
                    status: failure.status,
                    message: failure.message,
                });
            };

            if attempt >= policy.max_attempts {
                host.record_failure(self.pool.clock().now());
                log::debug!(
                    "Giving up on {method} {url} after {attempt} attempt(s): {}",
                    failure.message
                );
                return Err(ErrorKind::RetryableTransport {
                    host: host.key.clone(),
                    status: failure.status,
                    failure: reason,
                    attempts: attempt,
                    message: failure.message,
                });
            }

            let mut delay = policy.delay_for(attempt);
            if let Some(requested) = failure.retry_after {
                delay = delay.max(requested).min(policy.max_delay);
            }
            log::debug!(
                "Attempt {attempt}/{} for {method} {url} failed ({reason}): {}. Retrying in {}ms",
                policy.max_attempts,
                failure.message,
                delay.as_millis()
            );
            host.record_retry();
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// A single transport call, classified
    async fn attempt(
        &self,
        host: &Host,
        method: &Method,
        url: &Url,
        body: Option<&Vec<u8>>,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> std::result::Result<UpstreamResponse, AttemptFailure> {
        let mut request = self
            .reqwest_client
            .request(method.clone(), url.clone())
            .headers(headers.clone())
            .timeout(timeout);
        if let Some(body) = body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => UpstreamResponse::from_response(response, 0).await,
            Err(e) => Err(e),
        };
        let request_time = start.elapsed();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                host.record_transport_error(request_time);
                return Err(AttemptFailure::from_transport(&e));
            }
        };
        host.record_response(response.status, request_time, self.pool.clock().now());

        let status = response.status;
        if !(status.is_client_error() || status.is_server_error()) {
            return Ok(response);
        }

        let retry_after = match status {
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                retry_after(&response.headers)
            }
            _ => None,
        };
        Err(AttemptFailure {
            reason: status.retry_reason(),
            status: Some(status),
            retry_after,
            message: error_message(&response),
        })
    }
}

/// A short description of an error response: an excerpt of the body, or the
/// canonical reason if the body is empty.
fn error_message(response: &UpstreamResponse) -> String {
    let text = response.text();
    let text = text.trim();
    if text.is_empty() {
        return response
            .status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string();
    }
    match text.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// A convenience function to send a single GET request with default settings.
///
/// Every call builds a fresh client, so no rate limit or circuit state is
/// shared between calls. For more complex scenarios, see documentation of
/// [`ClientBuilder`] instead.
///
/// # Errors
///
/// Returns an `Err` if:
/// - The request client cannot be built (see [`ClientBuilder::client`] for failure cases).
/// - The request failed (see [`Client::get`] for failure cases).
pub async fn get(url: &str) -> Result<UpstreamResponse> {
    let client = ClientBuilder::builder().build().client()?;
    client.get(url, RequestOptions::default()).await
}

/// A convenience function to send a single POST request with default settings.
///
/// # Errors
///
/// Returns an `Err` if:
/// - The request client cannot be built (see [`ClientBuilder::client`] for failure cases).
/// - The request failed (see [`Client::post`] for failure cases).
pub async fn post(url: &str, body: impl Into<Vec<u8>>) -> Result<UpstreamResponse> {
    let client = ClientBuilder::builder().build().client()?;
    client.post(url, body, RequestOptions::default()).await
}
