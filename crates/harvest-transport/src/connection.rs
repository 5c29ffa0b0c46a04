use crate::error::TransportError;
use crate::factory::create_transport;
use crate::traits::Transport;
use crate::types::ConnectParams;
use actix::prelude::*;
use log::{error, info, trace, warn};
use tokio::sync::mpsc;

const OUTGOING_BUFFER: usize = 100;

/// Runs one transport inside the actor system.
///
/// Connects when started, pumps inbound text to `message_handler`, accepts
/// `SendMessage` for outbound text and reports lifecycle changes to
/// `supervisor`. The actor stops itself once the connection is gone.
pub struct ConnectionActor {
    params: ConnectParams,
    state: ConnectionState,
    message_handler: Recipient<IncomingMessage>,
    supervisor: Recipient<ConnectionStatusUpdate>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    pending_transport: Option<Box<dyn Transport>>,
    io_task: Option<SpawnHandle>,
}

impl ConnectionActor {
    pub fn new(
        params: ConnectParams,
        message_handler: Recipient<IncomingMessage>,
        supervisor: Recipient<ConnectionStatusUpdate>,
    ) -> Self {
        Self {
            params,
            state: ConnectionState::Idle,
            message_handler,
            supervisor,
            outgoing_tx: None,
            pending_transport: None,
            io_task: None,
        }
    }

    /// Uses a ready-made transport instead of building one from the URL.
    pub fn with_transport(
        params: ConnectParams,
        transport: Box<dyn Transport>,
        message_handler: Recipient<IncomingMessage>,
        supervisor: Recipient<ConnectionStatusUpdate>,
    ) -> Self {
        let mut actor = Self::new(params, message_handler, supervisor);
        actor.pending_transport = Some(transport);
        actor
    }

    fn start_io(&mut self, ctx: &mut Context<Self>) {
        if self.io_task.is_some() {
            warn!("Connection task already running ({:?})", self.state);
            return;
        }
        self.set_state(ConnectionState::Connecting);

        let transport = match self.pending_transport.take() {
            Some(t) => Ok(t),
            None => create_transport(&self.params),
        };
        let addr = ctx.address();
        let handler = self.message_handler.clone();
        let connect_timeout = self.params.connection_timeout;
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(OUTGOING_BUFFER);
        self.outgoing_tx = Some(outgoing_tx);

        let io = async move {
            let transport = match transport {
                Ok(t) => t,
                Err(e) => {
                    addr.do_send(TransportEvent::FailedToStart(e));
                    return;
                }
            };
            match tokio::time::timeout(connect_timeout, Self::open(transport)).await {
                Ok(Ok(transport)) => {
                    addr.do_send(TransportEvent::Connected);
                    let outcome = Self::pump(transport, outgoing_rx, handler).await;
                    addr.do_send(TransportEvent::Disconnected(outcome.err()));
                }
                Ok(Err(e)) => addr.do_send(TransportEvent::FailedToStart(e)),
                Err(_) => addr.do_send(TransportEvent::FailedToStart(TransportError::Timeout)),
            }
        };
        self.io_task = Some(ctx.spawn(io.into_actor(self)));
    }

    async fn open(mut transport: Box<dyn Transport>) -> Result<Box<dyn Transport>, TransportError> {
        transport.connect().await?;
        Ok(transport)
    }

    /// Read/write loop. Returns `Ok` on a graceful close from either side.
    async fn pump(
        mut transport: Box<dyn Transport>,
        mut outgoing_rx: mpsc::Receiver<String>,
        handler: Recipient<IncomingMessage>,
    ) -> Result<(), TransportError> {
        let result = loop {
            tokio::select! {
                outgoing = outgoing_rx.recv() => {
                    let Some(text) = outgoing else {
                        break Ok(());
                    };
                    trace!("-> {}", text);
                    if let Err(e) = transport.send(&text).await {
                        error!("Send failed, dropping connection: {}", e);
                        break Err(e);
                    }
                }
                incoming = transport.receive() => {
                    match incoming {
                        Some(Ok(text)) => {
                            trace!("<- {}", text);
                            if handler.try_send(IncomingMessage(text)).is_err() {
                                break Err(TransportError::Other("message handler is gone".into()));
                            }
                        }
                        Some(Err(e)) => {
                            error!("Receive failed, dropping connection: {}", e);
                            break Err(e);
                        }
                        None => break Ok(()),
                    }
                }
            }
        };
        if let Err(e) = transport.disconnect().await {
            warn!("Disconnect after loop exit: {}", e);
        }
        result
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!("Connection {:?} -> {:?}", self.state, state);
        self.state = state.clone();
        if self.supervisor.try_send(ConnectionStatusUpdate(state)).is_err() {
            warn!("Supervisor did not accept connection status update");
        }
    }
}

/// Lifecycle of the managed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    /// `Some` when the connection dropped because of an error.
    Disconnected(Option<TransportError>),
    FailedToStart(TransportError),
}

/// Outbound text for the browser.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<(), TransportError>")]
pub struct SendMessage(pub String);

/// Inbound text from the browser.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct IncomingMessage(pub String);

/// Closes the connection and stops the actor.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Disconnect;

#[derive(Message)]
#[rtype(result = "()")]
enum TransportEvent {
    Connected,
    Disconnected(Option<TransportError>),
    FailedToStart(TransportError),
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct ConnectionStatusUpdate(pub ConnectionState);

impl Actor for ConnectionActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_io(ctx);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        // dropping the sender ends the pump loop
        self.outgoing_tx = None;
        self.io_task = None;
        if !matches!(
            self.state,
            ConnectionState::Disconnected(_) | ConnectionState::FailedToStart(_)
        ) {
            self.set_state(ConnectionState::Disconnecting);
        }
        Running::Stop
    }
}

impl Handler<TransportEvent> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, msg: TransportEvent, ctx: &mut Context<Self>) {
        let state = match msg {
            TransportEvent::Connected => ConnectionState::Connected,
            TransportEvent::Disconnected(err) => ConnectionState::Disconnected(err),
            TransportEvent::FailedToStart(err) => ConnectionState::FailedToStart(err),
        };
        self.set_state(state);
        if matches!(
            self.state,
            ConnectionState::Disconnected(_) | ConnectionState::FailedToStart(_)
        ) {
            self.outgoing_tx = None;
            ctx.stop();
        }
    }
}

impl Handler<Disconnect> for ConnectionActor {
    type Result = ();

    fn handle(&mut self, _msg: Disconnect, ctx: &mut Context<Self>) {
        info!("Disconnect requested for {}", self.params.url);
        ctx.stop();
    }
}

impl Handler<SendMessage> for ConnectionActor {
    type Result = ResponseFuture<Result<(), TransportError>>;

    fn handle(&mut self, msg: SendMessage, _ctx: &mut Context<Self>) -> Self::Result {
        let state = self.state.clone();
        let tx = self.outgoing_tx.clone();
        Box::pin(async move {
            // commands queued while connecting are flushed once the socket opens
            if !matches!(state, ConnectionState::Connected | ConnectionState::Connecting) {
                return Err(TransportError::NotConnected(format!("{:?}", state)));
            }
            let tx = tx.ok_or_else(|| TransportError::NotConnected("no outgoing channel".into()))?;
            tx.send(msg.0)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
    }
}
