use std::sync::Once;

use anyhow::{Error, Result};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: Once = Once::new();

/// Installs the global subscriber once per process.
///
/// `RUST_LOG` sets the filter (default `info`). Output is JSON unless
/// `RUST_LOG_FORMAT=pretty`.
///
/// # Errors
/// Returns an error when another global subscriber was already installed.
pub fn init() -> Result<()> {
    let mut outcome = Ok(());
    TRACING_INIT.call_once(|| outcome = install());
    outcome
}

fn install() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let pretty = std::env::var("RUST_LOG_FORMAT").is_ok_and(|value| value == "pretty");

    let registry = tracing_subscriber::registry().with(env_filter);
    if pretty {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| Error::msg(e.to_string()))?;
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(false),
            )
            .try_init()
            .map_err(|e| Error::msg(e.to_string()))?;
    }

    info!(pretty, "tracing initialized");
    Ok(())
}
