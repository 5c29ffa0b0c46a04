//! # Harvest Core
//!
//! Shared plumbing for the workspace: layered configuration, the internal
//! error type every actor speaks, and the logger bootstrap.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    BrowserConfig, Config, GlobalConfig, StorageConfig, TimingConfig, TransportConfig, load_config,
};
pub use error::{CoreError, InternalError};
