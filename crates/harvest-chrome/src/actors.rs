//! Actors backing the Chrome `Browser` and `Page` handles.

use crate::discovery::{DevToolsHttp, most_recent_page};
use crate::error::ChromeError;
use crate::protocol::*;
use actix::prelude::*;
use base64::Engine;
use harvest_interfaces::{PdfOptions, TabInfo};
use harvest_protocol::{EventActor, EventSubscription, ProtocolEvent, SendCommand, execute};
use harvest_transport::Disconnect;
use log::{debug, info, warn};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;

/// Typed front for the command actor.
#[derive(Clone)]
pub struct Cdp {
    commands: Recipient<SendCommand>,
}

impl Cdp {
    pub fn new(commands: Recipient<SendCommand>) -> Self {
        Self { commands }
    }

    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<R, ChromeError> {
        let params = serde_json::to_value(params)?;
        let value = execute(
            &self.commands,
            session_id.map(str::to_string),
            method,
            params,
            timeout,
        )
        .await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Bounds applied to page-level operations.
#[derive(Debug, Clone)]
pub struct PageTimeouts {
    pub print: Duration,
}

impl Default for PageTimeouts {
    fn default() -> Self {
        Self {
            print: Duration::from_secs(120),
        }
    }
}

// ================= Messages =================

#[derive(Debug, Message)]
#[rtype(result = "Result<String, ChromeError>")]
pub struct GetVersion;

#[derive(Debug, Message)]
#[rtype(result = "Result<Vec<TabInfo>, ChromeError>")]
pub struct ListTabs;

#[derive(Debug, Message)]
#[rtype(result = "Result<Option<TabInfo>, ChromeError>")]
pub struct GetActiveTab;

#[derive(Debug, Message)]
#[rtype(result = "Result<(), ChromeError>")]
pub struct ActivateTab(pub String);

#[derive(Debug, Message)]
#[rtype(result = "Result<TabInfo, ChromeError>")]
pub struct OpenTab {
    pub url: String,
    pub background: bool,
}

#[derive(Debug, Message)]
#[rtype(result = "Result<Addr<ChromePageActor>, ChromeError>")]
pub struct AttachTab(pub String);

#[derive(Debug, Message)]
#[rtype(result = "Result<(), ChromeError>")]
pub struct CloseTab(pub String);

#[derive(Debug, Message)]
#[rtype(result = "()")]
pub struct ShutdownBrowser;

#[derive(Debug, Message)]
#[rtype(result = "Result<Value, ChromeError>")]
pub struct EvaluateScript(pub String);

#[derive(Debug, Message)]
#[rtype(result = "Result<(), ChromeError>")]
pub struct WaitForLoad(pub Duration);

#[derive(Debug, Message)]
#[rtype(result = "Result<Vec<u8>, ChromeError>")]
pub struct PrintToPdf(pub PdfOptions);

#[derive(Debug, Message)]
#[rtype(result = "Result<(), ChromeError>")]
pub struct DetachPage;

// ================= Chrome Browser Actor =================

pub struct ChromeBrowserActor {
    cdp: Cdp,
    events: Addr<EventActor>,
    http: DevToolsHttp,
    connection: Option<Recipient<Disconnect>>,
    timeouts: PageTimeouts,
}

impl ChromeBrowserActor {
    pub fn new(
        commands: Recipient<SendCommand>,
        events: Addr<EventActor>,
        http: DevToolsHttp,
        connection: Option<Recipient<Disconnect>>,
        timeouts: PageTimeouts,
    ) -> Self {
        Self {
            cdp: Cdp::new(commands),
            events,
            http,
            connection,
            timeouts,
        }
    }

    async fn tabs(cdp: &Cdp) -> Result<Vec<TabInfo>, ChromeError> {
        let result: GetTargetsResult = cdp.call(None, "Target.getTargets", json!({}), None).await?;
        Ok(result
            .target_infos
            .into_iter()
            .filter(TargetInfo::is_tab)
            .enumerate()
            .map(|(position, t)| TabInfo {
                id: t.target_id,
                position,
                url: t.url,
                title: t.title,
            })
            .collect())
    }
}

impl Actor for ChromeBrowserActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        info!("ChromeBrowserActor started");
        // target lifecycle events are only pushed once discovery is on
        let cdp = self.cdp.clone();
        ctx.spawn(
            async move {
                if let Err(e) = cdp
                    .call::<_, Value>(
                        None,
                        "Target.setDiscoverTargets",
                        SetDiscoverTargetsParams { discover: true },
                        None,
                    )
                    .await
                {
                    warn!("Target discovery not enabled: {}", e);
                }
            }
            .into_actor(self),
        );
    }

    fn stopping(&mut self, _ctx: &mut Context<Self>) -> Running {
        if let Some(connection) = self.connection.take() {
            connection.do_send(Disconnect);
        }
        Running::Stop
    }
}

impl Handler<GetVersion> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<String, ChromeError>>;

    fn handle(&mut self, _msg: GetVersion, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        Box::pin(async move {
            let version: GetVersionResult = cdp.call(None, "Browser.getVersion", json!({}), None).await?;
            Ok(version.product)
        })
    }
}

impl Handler<ListTabs> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<Vec<TabInfo>, ChromeError>>;

    fn handle(&mut self, _msg: ListTabs, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        Box::pin(async move { Self::tabs(&cdp).await })
    }
}

impl Handler<GetActiveTab> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<Option<TabInfo>, ChromeError>>;

    fn handle(&mut self, _msg: GetActiveTab, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        let http = self.http.clone();
        Box::pin(async move {
            let tabs = Self::tabs(&cdp).await?;
            let list = http.list().await?;
            let ids: Vec<&str> = tabs.iter().map(|t| t.id.as_str()).collect();
            let active_id = most_recent_page(&list, &ids).map(|e| e.id.clone());
            Ok(active_id.and_then(|id| tabs.into_iter().find(|t| t.id == id)))
        })
    }
}

impl Handler<ActivateTab> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<(), ChromeError>>;

    fn handle(&mut self, msg: ActivateTab, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        Box::pin(async move {
            cdp.call::<_, Value>(
                None,
                "Target.activateTarget",
                TargetIdParams { target_id: &msg.0 },
                None,
            )
            .await?;
            Ok(())
        })
    }
}

impl Handler<OpenTab> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<TabInfo, ChromeError>>;

    fn handle(&mut self, msg: OpenTab, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        Box::pin(async move {
            let created: CreateTargetResult = cdp
                .call(
                    None,
                    "Target.createTarget",
                    CreateTargetParams {
                        url: &msg.url,
                        background: msg.background,
                    },
                    None,
                )
                .await?;
            debug!("Opened tab {} for {}", created.target_id, msg.url);
            let position = Self::tabs(&cdp)
                .await
                .ok()
                .and_then(|tabs| tabs.into_iter().find(|t| t.id == created.target_id))
                .map(|t| t.position)
                .unwrap_or_default();
            Ok(TabInfo {
                id: created.target_id,
                position,
                url: msg.url,
                title: String::new(),
            })
        })
    }
}

impl Handler<AttachTab> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<Addr<ChromePageActor>, ChromeError>>;

    fn handle(&mut self, msg: AttachTab, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        let events = self.events.clone();
        let timeouts = self.timeouts.clone();
        Box::pin(async move {
            let attached: AttachToTargetResult = cdp
                .call(
                    None,
                    "Target.attachToTarget",
                    AttachToTargetParams {
                        target_id: &msg.0,
                        flatten: true,
                    },
                    None,
                )
                .await?;
            debug!("Attached to {} as session {}", msg.0, attached.session_id);
            Ok(ChromePageActor::new(msg.0, attached.session_id, cdp, events, timeouts).start())
        })
    }
}

impl Handler<CloseTab> for ChromeBrowserActor {
    type Result = ResponseFuture<Result<(), ChromeError>>;

    fn handle(&mut self, msg: CloseTab, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        Box::pin(async move {
            let outcome = cdp
                .call::<_, Value>(
                    None,
                    "Target.closeTarget",
                    TargetIdParams { target_id: &msg.0 },
                    None,
                )
                .await;
            match outcome {
                Err(e) if !e.is_target_gone() => Err(e),
                _ => Ok(()),
            }
        })
    }
}

impl Handler<ShutdownBrowser> for ChromeBrowserActor {
    type Result = ();

    fn handle(&mut self, _msg: ShutdownBrowser, ctx: &mut Context<Self>) {
        info!("Browser handle shut down");
        ctx.stop();
    }
}

// ================= Chrome Page Actor =================

pub struct ChromePageActor {
    target_id: String,
    session_id: String,
    cdp: Cdp,
    events: Addr<EventActor>,
    timeouts: PageTimeouts,
}

impl ChromePageActor {
    pub fn new(
        target_id: String,
        session_id: String,
        cdp: Cdp,
        events: Addr<EventActor>,
        timeouts: PageTimeouts,
    ) -> Self {
        Self {
            target_id,
            session_id,
            cdp,
            events,
            timeouts,
        }
    }
}

/// Expression that is true once the navigated document finished loading.
const LOADED_PROBE: &str =
    "location.href !== 'about:blank' && document.readyState === 'complete'";

fn concerns_tab(event: &ProtocolEvent, target_id: &str, session_id: &str) -> bool {
    match event.method.as_str() {
        "Target.targetDestroyed" => serde_json::from_value::<TargetDestroyedParams>(event.params.clone())
            .map(|p| p.target_id == target_id)
            .unwrap_or(false),
        "Target.detachedFromTarget" => {
            serde_json::from_value::<DetachedFromTargetParams>(event.params.clone())
                .map(|p| p.session_id == session_id)
                .unwrap_or(false)
        }
        _ => false,
    }
}

async fn evaluate(cdp: &Cdp, session_id: &str, expression: &str) -> Result<Value, ChromeError> {
    let result: EvaluateResult = cdp
        .call(
            Some(session_id),
            "Runtime.evaluate",
            EvaluateParams {
                expression,
                return_by_value: true,
                await_promise: true,
                user_gesture: true,
            },
            None,
        )
        .await?;
    match result.exception_details {
        Some(details) => Err(ChromeError::Script(details.message())),
        None => Ok(result.result.value),
    }
}

async fn wait_until_loaded(
    cdp: &Cdp,
    target_id: &str,
    session_id: &str,
    loaded: &mut EventSubscription,
    gone: &mut EventSubscription,
) -> Result<(), ChromeError> {
    cdp.call::<_, Value>(Some(session_id), "Page.enable", json!({}), None)
        .await?;
    if evaluate(cdp, session_id, LOADED_PROBE).await? == Value::Bool(true) {
        return Ok(());
    }
    loop {
        tokio::select! {
            event = loaded.next() => {
                return match event {
                    Some(_) => Ok(()),
                    None => Err(ChromeError::TargetClosed(target_id.to_string())),
                };
            }
            event = gone.next() => match event {
                Some(e) if concerns_tab(&e, target_id, session_id) => {
                    return Err(ChromeError::TargetClosed(target_id.to_string()));
                }
                Some(_) => continue,
                None => return Err(ChromeError::TargetClosed(target_id.to_string())),
            },
        }
    }
}

impl Actor for ChromePageActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("Page session {} for tab {}", self.session_id, self.target_id);
    }
}

impl Handler<EvaluateScript> for ChromePageActor {
    type Result = ResponseFuture<Result<Value, ChromeError>>;

    fn handle(&mut self, msg: EvaluateScript, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        let session_id = self.session_id.clone();
        Box::pin(async move { evaluate(&cdp, &session_id, &msg.0).await })
    }
}

impl Handler<WaitForLoad> for ChromePageActor {
    type Result = ResponseFuture<Result<(), ChromeError>>;

    fn handle(&mut self, msg: WaitForLoad, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        let target_id = self.target_id.clone();
        let session_id = self.session_id.clone();
        // subscribe before probing so a load between the two is not missed
        let mut loaded = EventSubscription::open(
            &self.events,
            &["Page.loadEventFired"],
            Some(session_id.clone()),
        );
        let mut gone = EventSubscription::open(
            &self.events,
            &["Target.targetDestroyed", "Target.detachedFromTarget"],
            None,
        );
        Box::pin(async move {
            let wait = wait_until_loaded(&cdp, &target_id, &session_id, &mut loaded, &mut gone);
            tokio::time::timeout(msg.0, wait)
                .await
                .map_err(|_| ChromeError::Timeout("page load"))?
        })
    }
}

impl Handler<PrintToPdf> for ChromePageActor {
    type Result = ResponseFuture<Result<Vec<u8>, ChromeError>>;

    fn handle(&mut self, msg: PrintToPdf, _ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        let session_id = self.session_id.clone();
        let timeout = self.timeouts.print;
        Box::pin(async move {
            cdp.call::<_, Value>(Some(&session_id), "Page.enable", json!({}), None)
                .await?;
            cdp.call::<_, Value>(Some(&session_id), "Runtime.enable", json!({}), None)
                .await?;
            let printed: PrintToPdfResult = cdp
                .call(
                    Some(&session_id),
                    "Page.printToPDF",
                    PrintToPdfParams {
                        print_background: msg.0.print_background,
                        prefer_css_page_size: msg.0.prefer_css_page_size,
                    },
                    Some(timeout),
                )
                .await?;
            base64::engine::general_purpose::STANDARD
                .decode(printed.data.as_bytes())
                .map_err(|e| ChromeError::PdfData(e.to_string()))
        })
    }
}

impl Handler<DetachPage> for ChromePageActor {
    type Result = ResponseFuture<Result<(), ChromeError>>;

    fn handle(&mut self, _msg: DetachPage, ctx: &mut Context<Self>) -> Self::Result {
        let cdp = self.cdp.clone();
        let session_id = self.session_id.clone();
        let addr = ctx.address();
        Box::pin(async move {
            let outcome = cdp
                .call::<_, Value>(
                    None,
                    "Target.detachFromTarget",
                    DetachFromTargetParams {
                        session_id: &session_id,
                    },
                    None,
                )
                .await;
            addr.do_send(StopPage);
            match outcome {
                // the tab may already be gone, which ends the session too
                Err(e) if !e.is_target_gone() => Err(e),
                _ => Ok(()),
            }
        })
    }
}

#[derive(Message)]
#[rtype(result = "()")]
struct StopPage;

impl Handler<StopPage> for ChromePageActor {
    type Result = ();

    fn handle(&mut self, _msg: StopPage, ctx: &mut Context<Self>) {
        ctx.stop();
    }
}
