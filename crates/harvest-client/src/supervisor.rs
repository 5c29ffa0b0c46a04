//! Top-level supervisor of the protocol stack for one browser connection.

use actix::prelude::*;
use harvest_chrome::actors::ShutdownBrowser;
use harvest_chrome::{ChromeBrowserActor, DevToolsHttp, PageTimeouts};
use harvest_core::{Config, InternalError};
use harvest_protocol::{CommandActor, EventActor};
use harvest_transport::{ConnectParams, ConnectionActor, ConnectionState, ConnectionStatusUpdate};
use log::{debug, error, info, warn};

/// Starts the connection, command and event actors.
#[derive(Message)]
#[rtype(result = "Result<CoreActorsInfo, InternalError>")]
pub struct StartCoreActors(pub ConnectParams);

#[derive(Clone)]
pub struct CoreActorsInfo {
    pub connection_actor: Addr<ConnectionActor>,
    pub command_actor: Addr<CommandActor>,
    pub event_actor: Addr<EventActor>,
}

/// Starts the Chrome browser actor on top of running core actors.
#[derive(Message)]
#[rtype(result = "Result<Addr<ChromeBrowserActor>, InternalError>")]
pub struct StartBrowserActor {
    pub core_actors: CoreActorsInfo,
    pub http: DevToolsHttp,
}

/// Latest connection state seen by the supervisor.
#[derive(Message)]
#[rtype(result = "ConnectionState")]
pub struct GetConnectionState;

pub struct SupervisorActor {
    config: Config,
    state: ConnectionState,
    core: Option<CoreActorsInfo>,
    browser_actor: Option<Addr<ChromeBrowserActor>>,
}

impl SupervisorActor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: ConnectionState::Idle,
            core: None,
            browser_actor: None,
        }
    }

    fn stop_dependents(&mut self) {
        if let Some(addr) = self.browser_actor.take() {
            addr.do_send(ShutdownBrowser);
        }
        self.core = None;
    }
}

impl Actor for SupervisorActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("SupervisorActor started");
    }

    fn stopping(&mut self, _ctx: &mut Context<Self>) -> Running {
        info!("SupervisorActor stopping");
        self.stop_dependents();
        Running::Stop
    }
}

impl Handler<StartCoreActors> for SupervisorActor {
    type Result = Result<CoreActorsInfo, InternalError>;

    fn handle(&mut self, msg: StartCoreActors, ctx: &mut Context<Self>) -> Self::Result {
        if let Some(core) = &self.core {
            warn!("Core actors already started");
            return Ok(core.clone());
        }
        let params = msg.0;
        info!("Starting core actors for {}", params.url);

        let event_actor = EventActor::default().start();

        // The command actor and the connection need each other's address:
        // reserve the command actor's context first, start it once the
        // connection exists. Outbound frames queue until the socket is up.
        let command_ctx = Context::<CommandActor>::new();
        let command_addr = command_ctx.address();
        let connection_actor = ConnectionActor::new(
            params,
            command_addr.clone().recipient(),
            ctx.address().recipient(),
        )
        .start();
        let command_actor = command_ctx.run(CommandActor::new(
            self.config.global.command_timeout,
            connection_actor.clone().recipient(),
            event_actor.clone().recipient(),
        ));

        let core = CoreActorsInfo {
            connection_actor,
            command_actor,
            event_actor,
        };
        self.core = Some(core.clone());
        Ok(core)
    }
}

impl Handler<StartBrowserActor> for SupervisorActor {
    type Result = Result<Addr<ChromeBrowserActor>, InternalError>;

    fn handle(&mut self, msg: StartBrowserActor, _ctx: &mut Context<Self>) -> Self::Result {
        if let Some(addr) = &self.browser_actor {
            warn!("ChromeBrowserActor already started");
            return Ok(addr.clone());
        }
        let core = msg.core_actors;
        let browser_actor = ChromeBrowserActor::new(
            core.command_actor.recipient(),
            core.event_actor,
            msg.http,
            Some(core.connection_actor.recipient()),
            PageTimeouts {
                print: self.config.timing.download,
            },
        )
        .start();
        info!("ChromeBrowserActor started");
        self.browser_actor = Some(browser_actor.clone());
        Ok(browser_actor)
    }
}

impl Handler<ConnectionStatusUpdate> for SupervisorActor {
    type Result = ();

    fn handle(&mut self, msg: ConnectionStatusUpdate, _ctx: &mut Context<Self>) {
        // pending commands fail fast once the socket is gone
        if let Some(core) = &self.core {
            core.command_actor.do_send(ConnectionStatusUpdate(msg.0.clone()));
        }

        match &msg.0 {
            ConnectionState::Connected => info!("Connected to the browser"),
            ConnectionState::Disconnected(Some(err)) => {
                warn!("Browser connection lost: {}", err);
                self.stop_dependents();
            }
            ConnectionState::Disconnected(None) => {
                info!("Browser connection closed");
                self.stop_dependents();
            }
            ConnectionState::FailedToStart(err) => {
                error!("Browser connection failed to start: {}", err);
                self.stop_dependents();
            }
            other => debug!("Connection state: {:?}", other),
        }
        self.state = msg.0;
    }
}

impl Handler<GetConnectionState> for SupervisorActor {
    type Result = MessageResult<GetConnectionState>;

    fn handle(&mut self, _msg: GetConnectionState, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.state.clone())
    }
}

impl Supervised for SupervisorActor {
    fn restarting(&mut self, _ctx: &mut Self::Context) {
        info!("SupervisorActor restarting");
        self.state = ConnectionState::Idle;
        self.core = None;
        self.browser_actor = None;
    }
}
