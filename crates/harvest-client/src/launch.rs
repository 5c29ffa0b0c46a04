//! Connecting to a running Chrome and wiring up a controller session.

use crate::badge::{BadgeActor, JobFamily, LogBadgeSink};
use crate::controller::{ControllerActor, JobTiming, Services};
use crate::error::ClientError;
use crate::export::FsDownloadSink;
use crate::extract::{DomContactReader, ExtractTiming};
use crate::store::{JsonFileStore, KvStore};
use crate::supervisor::{GetConnectionState, StartBrowserActor, StartCoreActors, SupervisorActor};
use actix::prelude::*;
use harvest_chrome::{ChromeBrowser, DevToolsHttp};
use harvest_core::Config;
use harvest_interfaces::Browser;
use harvest_transport::{ConnectParams, ConnectionState};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Where the browser-level WebSocket endpoint comes from.
#[derive(Debug, Clone)]
pub enum LaunchMode {
    /// Ask the DevTools HTTP endpoint (`/json/version`).
    Discover { http_base: String },
    /// Use a known `ws://.../devtools/browser/<id>` URL.
    Connect { url: String },
}

impl LaunchMode {
    pub fn from_config(cfg: &Config) -> Self {
        match &cfg.browser.ws_url_override {
            Some(url) => LaunchMode::Connect { url: url.clone() },
            None => LaunchMode::Discover {
                http_base: cfg.browser.http_base(),
            },
        }
    }
}

async fn determine_connection_params(mode: &LaunchMode, cfg: &Config) -> Result<ConnectParams, ClientError> {
    let url = match mode {
        LaunchMode::Connect { url } => {
            info!("Connecting to browser at {}", url);
            url.clone()
        }
        LaunchMode::Discover { http_base } => {
            info!("Looking up the DevTools endpoint at {}", http_base);
            DevToolsHttp::new(http_base.clone())
                .resolve_ws_url(cfg.browser.discovery_timeout)
                .await
                .map_err(|e| {
                    ClientError::ConnectError(format!(
                        "{} (start Chrome with --remote-debugging-port={})",
                        e, cfg.browser.debugging_port
                    ))
                })?
        }
    };
    Ok(ConnectParams {
        url,
        connection_timeout: cfg.transport.connect_timeout,
        ws_options: cfg.transport.websocket.clone(),
    })
}

async fn await_connected(supervisor: &Addr<SupervisorActor>, bound: Duration) -> Result<(), ClientError> {
    let deadline = Instant::now() + bound;
    loop {
        let state = supervisor
            .send(GetConnectionState)
            .await
            .map_err(|e| ClientError::SupervisorError(e.to_string()))?;
        match state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::FailedToStart(e) | ConnectionState::Disconnected(Some(e)) => {
                return Err(ClientError::ConnectError(e.to_string()));
            }
            ConnectionState::Disconnected(None) => {
                return Err(ClientError::ConnectError("connection closed".into()));
            }
            _ if Instant::now() >= deadline => {
                return Err(ClientError::ConnectError("timed out connecting".into()));
            }
            other => debug!("Waiting for connection ({:?})", other),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Connects to the browser described by `cfg`. Must run inside an actix
/// system.
pub async fn connect(cfg: &Config) -> Result<ChromeBrowser, ClientError> {
    let mode = LaunchMode::from_config(cfg);
    let params = determine_connection_params(&mode, cfg).await?;

    let supervisor = SupervisorActor::new(cfg.clone()).start();
    let core = supervisor
        .send(StartCoreActors(params))
        .await
        .map_err(|e| ClientError::SupervisorError(format!("mailbox error starting core actors: {}", e)))?
        .map_err(|e| ClientError::ActorSystemError(format!("core actors: {}", e)))?;

    await_connected(&supervisor, cfg.transport.connect_timeout).await?;

    let browser_actor = supervisor
        .send(StartBrowserActor {
            core_actors: core,
            http: DevToolsHttp::new(cfg.browser.http_base()),
        })
        .await
        .map_err(|e| ClientError::SupervisorError(format!("mailbox error starting browser actor: {}", e)))?
        .map_err(|e| ClientError::ActorSystemError(format!("browser actor: {}", e)))?;

    let browser = ChromeBrowser::new(browser_actor);
    info!("Connected to {}", browser.version().await?);
    Ok(browser)
}

/// The persisted state file named in the config.
pub fn open_store(cfg: &Config) -> Arc<JsonFileStore> {
    Arc::new(JsonFileStore::new(cfg.storage.state_file.clone()))
}

/// A running controller with its badge.
pub struct Session {
    pub controller: Addr<ControllerActor>,
    pub badge: Addr<BadgeActor>,
    pub browser: Arc<ChromeBrowser>,
}

/// Connects and starts the badge and controller actors.
pub async fn start_session(cfg: &Config, family: JobFamily) -> Result<Session, ClientError> {
    let browser = Arc::new(connect(cfg).await?);
    let kv: Arc<dyn KvStore> = open_store(cfg);
    let timing = &cfg.timing;

    let services = Services {
        browser: browser.clone(),
        kv,
        sink: Arc::new(FsDownloadSink::new(cfg.storage.download_dir.clone(), timing.download)),
        reader: Arc::new(DomContactReader::new(ExtractTiming {
            contact_wait: timing.contact_wait,
            poll_interval: timing.dom_poll_interval,
            modal_close: timing.modal_close,
        })),
        timing: JobTiming::from(timing),
    };
    let badge = BadgeActor::new(Box::new(LogBadgeSink), family, timing.badge_reset).start();
    let controller = ControllerActor::new(services, badge.clone(), family).start();

    Ok(Session {
        controller,
        badge,
        browser,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_url_skips_discovery() {
        let mut cfg = Config::default();
        assert!(matches!(
            LaunchMode::from_config(&cfg),
            LaunchMode::Discover { ref http_base } if http_base == "http://127.0.0.1:9222"
        ));
        cfg.browser.ws_url_override = Some("ws://127.0.0.1:9222/devtools/browser/x".into());
        assert!(matches!(LaunchMode::from_config(&cfg), LaunchMode::Connect { .. }));
    }

    #[actix_rt::test]
    async fn connect_params_take_transport_settings() {
        let mut cfg = Config::default();
        cfg.transport.connect_timeout = Duration::from_millis(1234);
        let mode = LaunchMode::Connect {
            url: "ws://h:1/devtools/browser/x".into(),
        };
        let params = determine_connection_params(&mode, &cfg).await.unwrap();
        assert_eq!(params.url, "ws://h:1/devtools/browser/x");
        assert_eq!(params.connection_timeout, Duration::from_millis(1234));
    }

    #[actix_rt::test]
    async fn unreachable_endpoint_is_a_connect_error() {
        let mut cfg = Config::default();
        cfg.browser.debugging_port = 1;
        cfg.browser.discovery_timeout = Duration::from_millis(200);
        let err = connect(&cfg).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectError(_)));
    }
}
