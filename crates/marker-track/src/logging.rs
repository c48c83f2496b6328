//! Log output for the `marker-track` binary and other hosts without a logger.
//!
//! Records from the tracking crates follow the requested level. Everything
//! else stays at `warn` or quieter. `RUST_LOG` overrides both.

use log::LevelFilter;

/// Target prefix shared by `marker_track`, `marker_track_core` and
/// `marker_track_adapters`.
pub const TRACKING_TARGET: &str = "marker_track";

/// Filter directives in `RUST_LOG` syntax for a requested level.
pub fn filter_directives(level: LevelFilter) -> String {
    let base = level.min(LevelFilter::Warn);
    format!(
        "{},{TRACKING_TARGET}={}",
        base.as_str().to_lowercase(),
        level.as_str().to_lowercase()
    )
}

/// Install a stderr logger for `level`. Later calls are no-ops.
#[cfg(not(feature = "tracing"))]
pub fn init(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .parse_filters(&filter_directives(level))
        .parse_default_env()
        .try_init();
}

/// Install a `tracing` subscriber for `level` and route `log` records into
/// it. Engine ticks and service updates are reported as spans on close.
#[cfg(feature = "tracing")]
pub fn init(level: LevelFilter) {
    use tracing_log::LogTracer;
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = LogTracer::init();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));
    let _ = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(fmt::time::Uptime::default())
        .with_writer(std::io::stderr)
        .try_init();
}
