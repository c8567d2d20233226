use std::collections::HashMap;
use std::time::{Duration, Instant};

use http::StatusCode;
use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::window::Window;

/// Number of request durations kept for the median and average
const REQUEST_TIME_SAMPLES: usize = 100;

/// A [`HashMap`] mapping hosts (as `scheme://host[:port]`) to their [`HostStats`]
#[derive(Debug, Default, Serialize)]
pub struct HostStatsMap(HashMap<String, HostStats>);

impl HostStatsMap {
    /// Host statistics ordered by attempt count, busiest host first
    #[must_use]
    pub fn sorted(&self) -> Vec<(String, HostStats)> {
        let mut hosts: Vec<_> = self
            .0
            .iter()
            .map(|(host, stats)| (host.clone(), stats.clone()))
            .collect();
        hosts.sort_by(|(a_host, a), (b_host, b)| {
            (b.total_requests, a_host).cmp(&(a.total_requests, b_host))
        });
        hosts
    }

    /// Number of hosts
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no host has been contacted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, HostStats>> for HostStatsMap {
    fn from(value: HashMap<String, HostStats>) -> Self {
        Self(value)
    }
}

/// Counters for a single upstream host.
///
/// `total_requests` counts transport attempts, so a call that succeeded on
/// its third attempt adds three requests and two retries.
#[derive(Debug, Clone)]
pub struct HostStats {
    /// Transport attempts made to this host
    pub total_requests: u64,
    /// Attempts answered with a success status
    pub successful_requests: u64,
    /// Attempts that were followed by another attempt
    pub retries: u64,
    /// Responses with a 4xx status other than 429
    pub client_errors: u64,
    /// Responses with a 5xx status
    pub server_errors: u64,
    /// Responses with 429 Too Many Requests
    pub rate_limited: u64,
    /// Attempts that failed without a response (timeout, reset, connect)
    pub transport_errors: u64,
    /// Calls rejected by the local token bucket
    pub rejected_by_rate_limit: u64,
    /// Calls rejected because the circuit was open
    pub rejected_by_circuit: u64,
    /// When the last successful response arrived
    pub last_success: Option<Instant>,
    /// Durations of the most recent attempts
    pub request_times: Window<Duration>,
    /// Response counts per status code
    pub status_codes: HashMap<u16, u64>,
}

impl Default for HostStats {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            retries: 0,
            client_errors: 0,
            server_errors: 0,
            rate_limited: 0,
            transport_errors: 0,
            rejected_by_rate_limit: 0,
            rejected_by_circuit: 0,
            last_success: None,
            request_times: Window::new(REQUEST_TIME_SAMPLES),
            status_codes: HashMap::new(),
        }
    }
}

impl HostStats {
    /// Record an attempt that produced a response
    pub fn record_response(&mut self, status: StatusCode, request_time: Duration, now: Instant) {
        self.total_requests += 1;
        *self.status_codes.entry(status.as_u16()).or_default() += 1;
        self.request_times.push(request_time);

        match status {
            StatusCode::TOO_MANY_REQUESTS => self.rate_limited += 1,
            s if s.is_client_error() => self.client_errors += 1,
            s if s.is_server_error() => self.server_errors += 1,
            _ => {
                self.successful_requests += 1;
                self.last_success = Some(now);
            }
        }
    }

    /// Record an attempt that failed before a response arrived
    pub fn record_transport_error(&mut self, request_time: Duration) {
        self.total_requests += 1;
        self.transport_errors += 1;
        self.request_times.push(request_time);
    }

    /// Attempts that did not end in a success status
    #[must_use]
    pub const fn failed_requests(&self) -> u64 {
        self.rate_limited + self.client_errors + self.server_errors + self.transport_errors
    }

    /// Middle value of the recent attempt durations
    #[must_use]
    pub fn median_request_time(&self) -> Option<Duration> {
        let mut samples: Vec<Duration> = self.request_times.iter().copied().collect();
        samples.sort_unstable();

        let upper = samples.len() / 2;
        match samples.len() {
            0 => None,
            n if n % 2 == 1 => Some(samples[upper]),
            _ => Some((samples[upper - 1] + samples[upper]) / 2),
        }
    }

    /// Mean of the recent attempt durations
    #[must_use]
    pub fn average_request_time(&self) -> Option<Duration> {
        let count = u32::try_from(self.request_times.len()).ok().filter(|&n| n > 0)?;
        Some(self.request_times.iter().sum::<Duration>() / count)
    }

    /// Percentage of attempts that failed, 0.0 to 100.0
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        ratio(self.failed_requests(), self.total_requests).map_or(0.0, |r| r * 100.0)
    }

    /// Share of successful attempts, 0.0 to 1.0
    ///
    /// A host without attempts has not failed yet and reports 1.0.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_requests, self.total_requests).unwrap_or(1.0)
    }

    /// One line for logs, e.g. `12 requests (75% success, 25% errors), avg: 180ms`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn summary(&self) -> String {
        let average = self
            .average_request_time()
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));
        let rejected = self.rejected_by_rate_limit + self.rejected_by_circuit;

        let mut line = format!(
            "{} requests ({}% success, {}% errors), avg: {average}",
            self.total_requests,
            (self.success_rate() * 100.0).round() as u64,
            self.error_rate().round() as u64,
        );
        if rejected > 0 {
            line.push_str(&format!(", {rejected} rejected"));
        }
        line
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

impl Serialize for HostStats {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = |d: Option<Duration>| d.map(|d| d.as_millis());

        let mut state = serializer.serialize_struct("HostStats", 14)?;
        state.serialize_field("total_requests", &self.total_requests)?;
        state.serialize_field("successful_requests", &self.successful_requests)?;
        state.serialize_field("success_rate", &self.success_rate())?;
        state.serialize_field("retries", &self.retries)?;
        state.serialize_field("client_errors", &self.client_errors)?;
        state.serialize_field("server_errors", &self.server_errors)?;
        state.serialize_field("rate_limited", &self.rate_limited)?;
        state.serialize_field("transport_errors", &self.transport_errors)?;
        state.serialize_field("rejected_by_rate_limit", &self.rejected_by_rate_limit)?;
        state.serialize_field("rejected_by_circuit", &self.rejected_by_circuit)?;
        state.serialize_field("error_rate", &self.error_rate())?;
        state.serialize_field("median_request_time_ms", &millis(self.median_request_time()))?;
        state.serialize_field("average_request_time_ms", &millis(self.average_request_time()))?;
        state.serialize_field("status_codes", &self.status_codes)?;
        state.end()
    }
}
