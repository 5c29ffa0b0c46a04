//! DevTools HTTP endpoints (`/json/version`, `/json/list`) of a Chrome
//! started with `--remote-debugging-port`.

use crate::error::ChromeError;
use backoff::{ExponentialBackoffBuilder, future::retry};
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// One entry of `/json/list`. Chrome orders the list by last activity, most
/// recent first.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct DevToolsHttp {
    base: String,
    client: reqwest::Client,
}

impl DevToolsHttp {
    /// `base` is `http://host:port` without a trailing slash.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn version(&self) -> Result<VersionInfo, ChromeError> {
        self.get_json("/json/version").await
    }

    pub async fn list(&self) -> Result<Vec<ListEntry>, ChromeError> {
        self.get_json("/json/list").await
    }

    /// Resolves the browser-level WebSocket endpoint, retrying while Chrome
    /// is still coming up.
    pub async fn resolve_ws_url(&self, give_up_after: Duration) -> Result<String, ChromeError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_secs(1))
            .with_max_elapsed_time(Some(give_up_after))
            .build();

        let info = retry(policy, || async {
            self.version().await.map_err(|e| {
                warn!("DevTools endpoint not ready at {}: {}", self.base, e);
                backoff::Error::transient(e)
            })
        })
        .await?;

        debug!("Browser {} at {}", info.browser, info.web_socket_debugger_url);
        Ok(info.web_socket_debugger_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ChromeError> {
        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChromeError::Discovery(format!("GET {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(ChromeError::Discovery(format!(
                "GET {}: HTTP {}",
                url,
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ChromeError::Discovery(format!("GET {}: bad body: {}", url, e)))
    }
}

/// The focused tab: the most recently active page in `/json/list` that is
/// still one of the known tab ids.
pub fn most_recent_page<'a>(list: &'a [ListEntry], tab_ids: &[&str]) -> Option<&'a ListEntry> {
    list.iter()
        .filter(|e| e.target_type == "page")
        .find(|e| tab_ids.contains(&e.id.as_str()))
}
