use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

use crate::verbosity::Verbosity;

/// Route `log` records to stderr, keeping stdout free for response bodies.
///
/// `RUST_LOG`, when set, replaces the `-v`/`-q` derived level entirely.
pub(crate) fn init_logging(verbose: Verbosity) {
    let mut builder = Builder::from_env(Env::default().filter_or("RUST_LOG", "warn"));
    builder
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    if std::env::var_os("RUST_LOG").is_none() {
        let level = verbose.log_level_filter();
        // reqwest and hyper stay at warn even with -vvv
        builder
            .filter_level(level.min(LevelFilter::Warn))
            .filter_module("outbound", level)
            .filter_module("outbound_lib", level);
    }

    builder.init();
}
