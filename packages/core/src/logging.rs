use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging for the exporter.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (the `--log-level`
/// flag) is used. Call once, from `main`.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Logging initialized");
}
