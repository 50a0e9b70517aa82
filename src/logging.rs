use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::ProgressStderr;

/// Logs to stderr, around any progress bar. `RUST_LOG` takes precedence over
/// the verbosity flags.
pub fn init(debug: bool, quiet: bool) {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={level}", env!("CARGO_CRATE_NAME"))));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(|| ProgressStderr).with_target(true))
        .init();
}
