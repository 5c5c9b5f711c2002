use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::{SubscriberInitExt as _, TryInitError};
use tracing_subscriber::{EnvFilter, Layer as _};

/// Installs the global subscriber. `RUST_LOG` wins over the configured filter.
pub fn setup_telemetry(default_filter: &str) -> Result<(), TryInitError> {
    let stdout_log = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(stdout_log.with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        ))
        .try_init()
}
