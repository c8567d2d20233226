use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use http::{HeaderMap, HeaderName, HeaderValue};
use outbound_lib::{RequestOptions, RetryOverrides};

use crate::verbosity::Verbosity;

/// Config file picked up from the current directory when `--config` is not given
pub(crate) const OUTBOUND_CONFIG_FILE: &str = "outbound.toml";

/// Parse a `-H 'Name: value'` argument.
///
/// Only the first colon separates name and value, so values such as URLs or
/// timestamps may contain colons of their own. Surrounding whitespace is
/// ignored.
fn parse_header(header: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = header
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{header}'"))?;
    let name = HeaderName::from_str(name.trim())
        .map_err(|e| format!("invalid header name '{}': {e}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid value for header '{name}': {e}"))?;
    Ok((name, value))
}

/// outbound sends HTTP requests the way scheduled syncs do: through a per-host
/// rate limiter, a circuit breaker and a retry loop with exponential backoff.
///
/// Use it to try an upstream API or to inspect the effective configuration.
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct OutboundOptions {
    /// Configuration file to use
    #[arg(
        short,
        long = "config",
        global = true,
        env = "OUTBOUND_CONFIG",
        long_help = "Configuration file to use

If not given, `outbound.toml` in the current directory is used when present."
    )]
    pub(crate) config_file: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) verbose: Verbosity,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Send a GET request and print the response body
    Get(RequestArgs),

    /// Send a POST request and print the response body
    Post {
        #[command(flatten)]
        request: RequestArgs,

        /// Request body. Use `@path` to read it from a file
        #[arg(short, long)]
        data: String,
    },

    /// Print the effective thresholds and defaults as JSON
    Stats,
}

#[derive(Args, Debug)]
pub(crate) struct RequestArgs {
    /// URL to request
    pub(crate) url: String,

    /// Custom request header
    #[arg(
        short = 'H',
        long = "header",
        value_parser = parse_header,
        long_help = "Set custom header for the request

Some APIs require custom headers to be set in order to return valid responses.
You can specify custom headers in the format 'Name: Value'. For example, 'Accept: application/json'.
Headers given here take precedence over headers from the configuration file.

This option can be specified multiple times."
    )]
    pub(crate) header: Vec<(HeaderName, HeaderValue)>,

    /// Maximum number of attempts, overriding `retry.max_attempts`
    #[arg(long)]
    pub(crate) max_attempts: Option<u32>,

    /// Timeout per attempt (e.g. `5s`, `500ms`), overriding `timeout`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) timeout: Option<Duration>,

    /// Print the status line and response headers before the body
    #[arg(short, long)]
    pub(crate) include: bool,

    /// Print per-host statistics to stderr after the request
    #[arg(long)]
    pub(crate) host_stats: bool,
}

impl RequestArgs {
    /// Per-call options for the library client
    pub(crate) fn request_options(&self) -> RequestOptions {
        let retry = RetryOverrides {
            max_attempts: self.max_attempts,
            ..RetryOverrides::default()
        };
        // Repeated names are kept, e.g. two `Accept` headers
        let mut headers = HeaderMap::new();
        for (name, value) in &self.header {
            headers.append(name, value.clone());
        }
        RequestOptions {
            retry,
            timeout: self.timeout,
            headers,
        }
    }
}

/// Resolve a `--data` argument, reading `@path` arguments from disk
pub(crate) fn read_body(data: &str) -> Result<Vec<u8>> {
    match data.strip_prefix('@') {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Cannot read request body from `{path}`"))
        }
        None => Ok(data.as_bytes().to_vec()),
    }
}
