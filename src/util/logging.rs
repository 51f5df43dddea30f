use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing/logging based on environment variables.
///
/// `RUST_LOG` selects the filter (default `info`); `json` switches the
/// formatter to one JSON object per line.
pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
