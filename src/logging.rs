//! Tracing subscriber setup for the CLI.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary (or to tests that want to see the output).

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs a global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `config.level` is used as the filter,
/// falling back to `warn` if it does not parse. Calling this more than once
/// is harmless, later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(false)
        .try_init();
}
