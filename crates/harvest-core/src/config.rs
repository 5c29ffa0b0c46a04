use crate::error::CoreError;
use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[cfg(feature = "websocket")]
pub use harvest_transport::WebSocketConnectOptions;

mod duration_ms_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Deployment configuration. Job preferences chosen by the user live in the
/// state store instead.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub transport: TransportConfig,
    pub browser: BrowserConfig,
    pub storage: StorageConfig,
    pub timing: TimingConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
    #[serde(rename = "command_timeout_ms", with = "duration_ms_serde")]
    pub command_timeout: Duration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            command_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(rename = "connect_timeout_ms", with = "duration_ms_serde")]
    pub connect_timeout: Duration,
    #[cfg(feature = "websocket")]
    pub websocket: WebSocketConnectOptions,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            #[cfg(feature = "websocket")]
            websocket: WebSocketConnectOptions::default(),
        }
    }
}

/// How to reach the user's Chrome (started with `--remote-debugging-port`).
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    pub debugging_host: String,
    pub debugging_port: u16,
    /// Full `ws://` endpoint; skips `/json/version` discovery when set.
    pub ws_url_override: Option<String>,
    #[serde(rename = "discovery_timeout_ms", with = "duration_ms_serde")]
    pub discovery_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debugging_host: "127.0.0.1".to_string(),
            debugging_port: 9222,
            ws_url_override: None,
            discovery_timeout: Duration::from_secs(5),
        }
    }
}

impl BrowserConfig {
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.debugging_host, self.debugging_port)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding collected rows and saved settings.
    pub state_file: PathBuf,
    /// Root under which exported PDFs are written.
    pub download_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("harvest-state.json"),
            download_dir: PathBuf::from("downloads"),
        }
    }
}

/// Fixed waits and bounds used by the batch jobs.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(rename = "collect_settle_ms", with = "duration_ms_serde")]
    pub collect_settle: Duration,
    #[serde(rename = "collect_gap_ms", with = "duration_ms_serde")]
    pub collect_gap: Duration,
    #[serde(rename = "contact_wait_ms", with = "duration_ms_serde")]
    pub contact_wait: Duration,
    #[serde(rename = "dom_poll_interval_ms", with = "duration_ms_serde")]
    pub dom_poll_interval: Duration,
    #[serde(rename = "modal_close_ms", with = "duration_ms_serde")]
    pub modal_close: Duration,
    #[serde(rename = "page_load_ms", with = "duration_ms_serde")]
    pub page_load: Duration,
    #[serde(rename = "download_ms", with = "duration_ms_serde")]
    pub download: Duration,
    #[serde(rename = "badge_reset_ms", with = "duration_ms_serde")]
    pub badge_reset: Duration,
    #[serde(rename = "status_poll_ms", with = "duration_ms_serde")]
    pub status_poll: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            collect_settle: Duration::from_millis(350),
            collect_gap: Duration::from_millis(450),
            contact_wait: Duration::from_millis(7000),
            dom_poll_interval: Duration::from_millis(120),
            modal_close: Duration::from_millis(2500),
            page_load: Duration::from_millis(45_000),
            download: Duration::from_millis(120_000),
            badge_reset: Duration::from_millis(4500),
            status_poll: Duration::from_millis(700),
        }
    }
}

/// Loads configuration: built-in defaults, then `harvest.toml` (or the file
/// given), then `HARVEST__SECTION__KEY` environment variables.
///
/// e.g. `HARVEST__BROWSER__DEBUGGING_PORT=9333`, `HARVEST__TIMING__PAGE_LOAD_MS=60000`.
pub fn load_config(path: Option<&Path>) -> Result<Config, CoreError> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name("harvest").required(false),
    };
    let loaded = ConfigLoader::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("HARVEST")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    loaded.try_deserialize().map_err(CoreError::ConfigLoad)
}
