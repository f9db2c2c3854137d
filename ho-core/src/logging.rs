//! Logging setup shared by the binaries.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Install a global `tracing` subscriber.
///
/// `level` is a default directive (`info`, `debug`, `ho_gen=trace`, ...); `RUST_LOG` wins when set.
/// Calling this twice is harmless: the second install is ignored.
pub fn setup(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .try_init();
}
