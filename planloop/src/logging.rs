//! Diagnostic tracing for planloop.
//!
//! Tracing output is for operators debugging a run: it goes to stderr, is
//! controlled by `RUST_LOG` or `-v`, and is never persisted. The durable
//! record of a run is the session file under `.planloop/sessions/`, which is
//! written regardless of the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for a `-v` count when `RUST_LOG` is unset.
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,planloop=info",
        _ => "warn,planloop=debug",
    }
}

/// Install the global subscriber: compact format on stderr.
///
/// `RUST_LOG` wins over `verbosity` when set.
///
/// # Example
/// ```bash
/// RUST_LOG=planloop=debug planloop run plan.md
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
