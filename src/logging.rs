use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so they never interleave
/// with the report on stdout. `RUST_LOG` takes precedence over `verbosity`.
pub fn init(verbosity: u8, use_color: bool) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mediabatch={}", default_level)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(use_color)
        .compact();

    // Ignore a second initialization (tests, embedding).
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
