//! Logger bootstrap for binaries built on this workspace.

use crate::error::CoreError;

/// Installs `env_logger` with `level` as the fallback filter. `RUST_LOG` wins
/// when set. Calling it twice returns `LoggingSetup`.
#[cfg(feature = "env_logger")]
pub fn setup_logging(level: &str) -> Result<(), CoreError> {
    use env_logger::{Builder, Env};
    use log::LevelFilter;
    use std::str::FromStr;

    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    Builder::from_env(Env::default().default_filter_or(level.to_string()))
        .filter_module("tungstenite", LevelFilter::Info)
        .filter_module("tokio_tungstenite", LevelFilter::Info)
        .filter_module("hyper", LevelFilter::Info)
        .filter_module("reqwest", LevelFilter::Info)
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| CoreError::LoggingSetup(e.to_string()))
}

#[cfg(not(feature = "env_logger"))]
pub fn setup_logging(_level: &str) -> Result<(), CoreError> {
    log::debug!("env_logger feature disabled; leaving logger setup to the caller");
    Ok(())
}
