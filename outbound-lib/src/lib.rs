//! `outbound` is a library for talking to third-party HTTP APIs without
//! hammering them when they struggle.
//!
//! Every request goes through three policies, per upstream host:
//!
//! 1. a fixed-window token bucket (rate limiting),
//! 2. a circuit breaker that fails fast while the host keeps failing,
//! 3. a retry loop with exponential backoff and jitter.
//!
//! "Hello world" example:
//! ```no_run
//! use outbound_lib::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let response = outbound_lib::get("https://api.aladhan.com/v1/timingsByCity?city=Cairo&country=EG").await?;
//!   println!("{}", response.text());
//!   Ok(())
//! }
//! ```
//!
//! Long-running services should build one [`Client`] and share it, so that
//! rate limits and circuit state are tracked across calls:
//!
//! ```no_run
//! use std::time::Duration;
//! use outbound_lib::{ClientBuilder, ErrorCategory, RequestOptions, Result, RetryOverrides};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::default().client()?;
//!   let options = RequestOptions::builder()
//!       .retry(RetryOverrides::builder().max_attempts(5).build())
//!       .timeout(Duration::from_secs(5))
//!       .build();
//!
//!   match client.get("https://prices.example.com/gold", options).await {
//!     Ok(response) => println!("{}", response.text()),
//!     Err(e) if e.category() == ErrorCategory::AdmissionDenied => {
//!       // Try again on the next scheduled run
//!     }
//!     Err(e) => return Err(e),
//!   }
//!   Ok(())
//! }
//! ```

mod breaker;
mod client;
mod clock;
mod config;
mod headers;
mod host;
mod pool;
mod ratelimit;
mod retry;
mod retryable;
mod stats;
mod types;
mod window;

pub use breaker::{CircuitBreakerConfig, CircuitState};
pub use client::{Client, ClientBuilder, get, post};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    Config, ConfigError, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HostConfig, HostConfigs,
};
pub use host::{HostKey, HostStats, HostStatsMap};
pub use ratelimit::RateLimitConfig;
pub use retry::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    RetryOverrides, RetryPolicy,
};
pub use stats::ClientStats;
pub use types::*;
pub use window::Window;
