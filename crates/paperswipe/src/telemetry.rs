use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Logs go to stderr so stdout stays machine-readable.
///
/// `RUST_LOG` sets the filter (default `info`); `PAPERSWIPE_LOG_JSON=1` switches to JSON lines.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if std::env::var("PAPERSWIPE_LOG_JSON").ok().as_deref() == Some("1") {
        let _ = fmt.json().try_init();
    } else {
        let _ = fmt.try_init();
    }
}
