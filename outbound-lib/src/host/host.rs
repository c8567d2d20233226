use http::{HeaderMap, StatusCode};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::key::HostKey;
use super::stats::HostStats;
use crate::ErrorKind;
use crate::breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::ratelimit::{RateLimitConfig, TokenBucket};
use crate::types::Result;

/// Mutable policy state of a host, guarded by a single lock
#[derive(Debug)]
struct HostState {
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    stats: HostStats,
}

/// A single upstream host with its own token bucket, circuit breaker and
/// statistics.
///
/// All policy decisions for the host are made under one short-lived lock that
/// is never held across an `.await`, so unrelated hosts never contend and
/// transitions of one host are linearizable.
#[derive(Debug)]
pub struct Host {
    /// The host this instance manages
    pub key: HostKey,

    /// Headers sent with every request to this host
    headers: HeaderMap,

    state: Mutex<HostState>,
}

impl Host {
    /// Create a new host with a full bucket and a closed circuit
    #[must_use]
    pub(crate) fn new(
        key: HostKey,
        rate_limit: RateLimitConfig,
        circuit_breaker: CircuitBreakerConfig,
        headers: HeaderMap,
        now: Instant,
    ) -> Self {
        Host {
            key,
            headers,
            state: Mutex::new(HostState {
                limiter: TokenBucket::new(rate_limit, now),
                breaker: CircuitBreaker::new(circuit_breaker),
                stats: HostStats::default(),
            }),
        }
    }

    /// Host-specific headers from the configuration
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Admit a call: the token bucket is consulted first, then the circuit.
    ///
    /// A call rejected by the circuit has already spent its token.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::RateLimitExceeded`] or [`ErrorKind::CircuitOpen`].
    pub(crate) fn admit(&self, now: Instant) -> Result<()> {
        let mut state = self.lock();

        if let Err(retry_in) = state.limiter.try_consume(now) {
            state.stats.rejected_by_rate_limit += 1;
            log::debug!(
                "Rate limit exceeded for {}, window refills in {}ms",
                self.key,
                retry_in.as_millis()
            );
            return Err(ErrorKind::RateLimitExceeded {
                host: self.key.clone(),
                retry_in,
            });
        }

        match state.breaker.admit(now) {
            Ok(Admission::Closed) => Ok(()),
            Ok(Admission::Trial) => {
                log::debug!("Circuit for {} is half-open, admitting trial request", self.key);
                Ok(())
            }
            Err(retry_in) => {
                state.stats.rejected_by_circuit += 1;
                Err(ErrorKind::CircuitOpen {
                    host: self.key.clone(),
                    retry_in,
                })
            }
        }
    }

    /// Record an attempt that produced a response
    pub(crate) fn record_response(&self, status: StatusCode, request_time: Duration, now: Instant) {
        self.lock().stats.record_response(status, request_time, now);
    }

    /// Record an attempt that failed without a response
    pub(crate) fn record_transport_error(&self, request_time: Duration) {
        self.lock().stats.record_transport_error(request_time);
    }

    /// Record that a failed attempt is going to be retried
    pub(crate) fn record_retry(&self) {
        self.lock().stats.retries += 1;
    }

    /// Report a successful call to the circuit breaker
    pub(crate) fn record_success(&self) {
        let previous = self.lock().breaker.record_success();
        if previous != CircuitState::Closed {
            log::info!("Circuit for {} closed after successful trial", self.key);
        }
    }

    /// Report a failed call to the circuit breaker
    pub(crate) fn record_failure(&self, now: Instant) {
        let mut state = self.lock();
        let was_half_open = state.breaker.state() == CircuitState::HalfOpen;
        if state.breaker.record_failure(now) {
            let failures = state.breaker.recent_failures(now);
            drop(state);
            if was_half_open {
                log::warn!("Circuit for {} reopened after failed trial", self.key);
            } else {
                log::warn!(
                    "Circuit for {} opened after {failures} failures",
                    self.key
                );
            }
        }
    }

    /// Current circuit state, without evaluating pending transitions
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.lock().breaker.state()
    }

    /// Snapshot of this host's statistics
    #[must_use]
    pub fn stats(&self) -> HostStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        // The state stays consistent even if a panic interrupted a holder
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
