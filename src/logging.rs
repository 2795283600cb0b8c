//! Logging configuration using tracing

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system.
///
/// `RUST_LOG` wins unless `verbose` is set; otherwise everything logs at
/// `info`, which includes each enforcement step. Plain output is stamped
/// with local wall-clock time.
pub fn init(verbose: bool, json: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoLocal::new("[%H:%M:%S]".to_string()))
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}
