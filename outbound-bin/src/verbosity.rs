//! `-v` / `-q` flags for the log level.
//!
//! By default warnings and errors are reported, so an opening circuit is
//! always visible.
//! - `-q` only errors, `-qq` silences output
//! - `-v` show info
//! - `-vv` show debug, including every retried attempt
//! - `-vvv` show trace

use log::LevelFilter;

#[derive(clap::Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// Pass many times for more log output
    ///
    /// By default, it'll report warnings and errors. Passing `-v` one time
    /// also prints info, `-vv` enables debug logging (e.g. retries) and
    /// `-vvv` trace.
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet",
    )]
    verbose: u8,

    /// Less output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

impl Verbosity {
    /// Get the log level filter.
    pub(crate) fn log_level_filter(self) -> LevelFilter {
        level_filter(self.verbosity())
    }

    #[allow(clippy::cast_lossless)]
    const fn verbosity(self) -> i16 {
        level_value(LevelFilter::Warn) - self.quiet as i16 + self.verbose as i16
    }
}

const fn level_value(level: LevelFilter) -> i16 {
    match level {
        LevelFilter::Off => 0,
        LevelFilter::Error => 1,
        LevelFilter::Warn => 2,
        LevelFilter::Info => 3,
        LevelFilter::Debug => 4,
        LevelFilter::Trace => 5,
    }
}

const fn level_filter(verbosity: i16) -> LevelFilter {
    match verbosity {
        i16::MIN..=0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbosity(verbose: u8, quiet: u8) -> Verbosity {
        Verbosity { verbose, quiet }
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(verbosity(0, 0).log_level_filter(), LevelFilter::Warn);
        assert_eq!(verbosity(1, 0).log_level_filter(), LevelFilter::Info);
        assert_eq!(verbosity(2, 0).log_level_filter(), LevelFilter::Debug);
        assert_eq!(verbosity(9, 0).log_level_filter(), LevelFilter::Trace);
        assert_eq!(verbosity(0, 1).log_level_filter(), LevelFilter::Error);
        assert_eq!(verbosity(0, 2).log_level_filter(), LevelFilter::Off);
        assert_eq!(verbosity(0, 200).log_level_filter(), LevelFilter::Off);
    }
}
