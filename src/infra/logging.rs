//! Logging configuration
//!
//! Initializes tracing for the application. Diagnostics go to stderr so they
//! never mix with the report printed on stdout.

use tracing_subscriber::{EnvFilter, fmt};

/// Maps the number of `-v` flags onto a level, starting from `base`.
pub fn level_for_verbosity(base: &str, verbose: u8) -> &str {
    match verbose {
        0 => base,
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initializes logging with the specified level. `RUST_LOG` takes precedence.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
