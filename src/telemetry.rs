//! Log subscriber setup for binaries. The library itself only emits `tracing` events.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use crate::error::{PpeError, Result};

/// Installs a stderr formatter. `RUST_LOG` wins over `default_filter` when set.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| PpeError::Config(format!("invalid log filter '{}': {}", default_filter, e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| PpeError::Config(format!("cannot install log subscriber: {}", e)))
}
