//! Logging initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The level is controlled by the `RUST_LOG` environment variable and
/// defaults to `info`. `color` switches ANSI escape sequences in the
/// output on or off; it comes from the `--color` flag or the
/// `logging.color_logging` configuration option.
///
/// Call once at startup, after configuration has been read.
pub fn init(color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(color))
        .init();
}
