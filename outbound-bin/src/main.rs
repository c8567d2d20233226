//! `outbound` sends HTTP requests through the same resilience layer that
//! scheduled upstream syncs use: a per-host rate limiter, a circuit breaker
//! and a retry loop with exponential backoff.
//!
//! The outbound binary is a wrapper around outbound-lib, which provides
//! convenience functions for probing upstream APIs from the command-line.
//!
//! Fetch a resource:
//! ```sh
//! outbound get "https://api.aladhan.com/v1/timingsByCity?city=Cairo&country=EG"
//! ```
//!
//! Send a request body, with a custom header and more patience:
//! ```sh
//! outbound post https://prices.example.com/sync --data @payload.json \
//!     -H 'Content-Type: application/json' --max-attempts 5 --timeout 10s
//! ```
//!
//! Show the effective configuration:
//! ```sh
//! outbound --config outbound.toml stats
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Error, Result};
use clap::Parser;
use formatters::host_stats::write_host_stats;
use formatters::log::init_logging;
use formatters::response::write_response;
use log::{error, info};
use outbound_lib::{Client, ClientBuilder, Config, HostKey};

mod formatters;
mod options;
mod verbosity;

use crate::options::{Command, OUTBOUND_CONFIG_FILE, OutboundOptions, RequestArgs, read_body};

/// Process exit codes, cast to `i32` when exiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // Any error that reaches `main()` through `?`, e.g. a malformed URL
    // or an unreadable `--data @file`
    #[allow(unused)]
    UnexpectedFailure = 1,
    UpstreamFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // `process::exit` skips destructors, so everything that owns resources
    // lives in `run_main` and is dropped before we get here
    let code = run_main()?;
    std::process::exit(code);
}

/// Load the config file given with `--config`, or `outbound.toml` from the
/// current directory if it exists, or fall back to the defaults.
fn load_config(opts: &OutboundOptions) -> Result<Config> {
    let path = match &opts.config_file {
        Some(path) => path.clone(),
        None => {
            let default_config = PathBuf::from(OUTBOUND_CONFIG_FILE);
            if !default_config.is_file() {
                return Ok(Config::default());
            }
            default_config
        }
    };

    let config = Config::load_from_file(&path)
        .with_context(|| format!("Cannot load configuration file `{}`", path.display()))?;
    info!("Loaded configuration from `{}`", path.display());
    Ok(config)
}

/// Set up runtime and call outbound entrypoint
fn run_main() -> Result<i32> {
    let opts = OutboundOptions::parse();
    init_logging(opts.verbose);

    let config = match load_config(&opts) {
        Ok(config) => config,
        Err(e) => {
            error!("Error while loading config: {e:#}");
            return Ok(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(run(&opts, config)) {
        Err(e) if Some(io::ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            Ok(ExitCode::Success as i32)
        }
        res => res,
    }
}

/// The kind of the first I/O error in the chain, if any
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(io::Error::kind)
}

/// Run the requested subcommand
async fn run(opts: &OutboundOptions, config: Config) -> Result<i32> {
    let client = ClientBuilder::from_config(config).client()?;

    match &opts.command {
        Command::Get(request) => send(&client, request, None).await,
        Command::Post { request, data } => send(&client, request, Some(read_body(data)?)).await,
        Command::Stats => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &client.stats())?;
            writeln!(stdout)?;
            Ok(ExitCode::Success as i32)
        }
    }
}

/// Send a single request and print the response body to stdout
async fn send(client: &Client, request: &RequestArgs, body: Option<Vec<u8>>) -> Result<i32> {
    let options = request.request_options();
    let result = match body {
        Some(body) => client.post(&request.url, body, options).await,
        None => client.get(&request.url, options).await,
    };
    if let Ok(host) = request.url.parse::<HostKey>() {
        info!("{host}: {}", client.host_stats(&host).summary());
    }
    if request.host_stats {
        write_host_stats(&mut io::stderr().lock(), &client.all_host_stats())?;
    }

    match result {
        Ok(response) => {
            if response.attempts > 1 {
                info!(
                    "{} succeeded after {} attempts",
                    response.url, response.attempts
                );
            }
            write_response(&mut io::stdout().lock(), &response, request.include)?;
            Ok(ExitCode::Success as i32)
        }
        // Errors tied to a host come from the upstream or from admission control
        Err(e) if e.host().is_some() => {
            error!("{e} [{}]", e.category());
            Ok(ExitCode::UpstreamFailure as i32)
        }
        Err(e) => Err(e).context("Cannot send request"),
    }
}
