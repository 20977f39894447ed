//! Process-wide log subscriber.

use tracing_subscriber::EnvFilter;

use crate::error::{NewsError, Result};

/// Install the fmt subscriber on stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Colors are only used
/// when stderr is a terminal.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| NewsError::Config(format!("invalid log filter '{}': {}", default_filter, e)))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init()
        .map_err(|e| NewsError::Config(format!("failed to install log subscriber: {}", e)))
}
