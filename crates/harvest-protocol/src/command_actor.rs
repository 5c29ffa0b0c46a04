//! Sends CDP commands, matches replies by id and enforces timeouts.

use crate::messages::{
    CommandResult, CommandTimeout, IncomingJson, JsonRpcRequest, PendingRequest, ProtocolEvent,
    SendCommand,
};
use actix::prelude::*;
use harvest_core::InternalError;
use harvest_transport::{ConnectionState, ConnectionStatusUpdate, IncomingMessage, SendMessage};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use std::{collections::HashMap, time::Duration};

pub struct CommandActor {
    default_timeout: Duration,
    connection: Recipient<SendMessage>,
    events: Recipient<ProtocolEvent>,
    next_id: i64,
    pending: HashMap<i64, PendingRequest>,
}

impl CommandActor {
    pub fn new(
        default_timeout: Duration,
        connection: Recipient<SendMessage>,
        events: Recipient<ProtocolEvent>,
    ) -> Self {
        Self {
            default_timeout,
            connection,
            events,
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    fn complete(&mut self, id: i64, result: CommandResult, ctx: &mut Context<Self>) {
        let Some(pending) = self.pending.remove(&id) else {
            warn!("Reply for unknown or expired command id {}", id);
            return;
        };
        ctx.cancel_future(pending.timeout_handle);
        if pending.result_tx.send(result).is_err() {
            debug!("Caller of {} (id {}) stopped waiting", pending.method, id);
        }
    }

    fn fail_all(&mut self, ctx: &mut Context<Self>, make_err: impl Fn() -> InternalError) {
        for (id, pending) in self.pending.drain() {
            ctx.cancel_future(pending.timeout_handle);
            let _ = pending.result_tx.send(Err(make_err()));
            debug!("Failed pending command {} ({})", id, pending.method);
        }
    }

    fn forward_event(&self, session_id: Option<String>, method: String, params: Option<Value>) {
        let event = ProtocolEvent {
            session_id,
            method,
            params: params.unwrap_or(Value::Null),
        };
        if self.events.try_send(event).is_err() {
            error!("Event dispatcher is gone; dropping event");
        }
    }
}

impl Actor for CommandActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        info!("CommandActor started");
    }

    fn stopping(&mut self, ctx: &mut Context<Self>) -> Running {
        self.fail_all(ctx, || InternalError::Actor("command actor stopped".into()));
        Running::Stop
    }
}

impl Handler<SendCommand> for CommandActor {
    type Result = Result<(), InternalError>;

    fn handle(&mut self, msg: SendCommand, ctx: &mut Context<Self>) -> Self::Result {
        let id = self.next_id;
        self.next_id += 1;

        let request = JsonRpcRequest {
            id,
            method: &msg.method,
            params: &msg.params,
            session_id: msg.session_id.as_deref(),
        };
        let text = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => {
                let err = InternalError::Serialization(e.to_string());
                let _ = msg.result_tx.send(Err(InternalError::Serialization(e.to_string())));
                return Err(err);
            }
        };
        trace!("Command {} -> {}", id, msg.method);

        let timeout = msg.timeout.unwrap_or(self.default_timeout);
        let timeout_handle = ctx.notify_later(CommandTimeout(id), timeout);
        self.pending.insert(
            id,
            PendingRequest {
                method: msg.method,
                result_tx: msg.result_tx,
                timeout_handle,
            },
        );

        let delivery = self.connection.send(SendMessage(text));
        let fut = async move {
            match delivery.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(InternalError::Transport(e)),
                Err(e) => Some(InternalError::Actor(format!("connection mailbox: {}", e))),
            }
        }
        .into_actor(self)
        .map(move |failure, actor, ctx| {
            if let Some(err) = failure {
                error!("Command {} not delivered: {}", id, err);
                actor.complete(id, Err(err), ctx);
            }
        });
        ctx.spawn(fut);
        Ok(())
    }
}

impl Handler<IncomingMessage> for CommandActor {
    type Result = ();

    fn handle(&mut self, msg: IncomingMessage, ctx: &mut Context<Self>) {
        let parsed = match serde_json::from_str::<IncomingJson>(&msg.0) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Unparsable frame from browser: {}", e);
                return;
            }
        };
        match (parsed.id, parsed.method) {
            (Some(id), _) => {
                let result = match parsed.error {
                    Some(err) => Err(InternalError::Protocol {
                        code: Some(err.code),
                        message: err.message,
                        data: err.data.map(|d| d.to_string()),
                    }),
                    None => Ok(parsed.result.unwrap_or(Value::Null)),
                };
                self.complete(id, result, ctx);
            }
            (None, Some(method)) => self.forward_event(parsed.session_id, method, parsed.params),
            (None, None) => match parsed.error {
                Some(err) => warn!("Protocol error without id: {} ({})", err.message, err.code),
                None => warn!("Ignoring frame with neither id nor method"),
            },
        }
    }
}

impl Handler<CommandTimeout> for CommandActor {
    type Result = ();

    fn handle(&mut self, msg: CommandTimeout, _ctx: &mut Context<Self>) {
        if let Some(pending) = self.pending.remove(&msg.0) {
            warn!("Command {} ({}) timed out", msg.0, pending.method);
            let _ = pending.result_tx.send(Err(InternalError::Timeout));
        }
    }
}

impl Handler<ConnectionStatusUpdate> for CommandActor {
    type Result = ();

    fn handle(&mut self, msg: ConnectionStatusUpdate, ctx: &mut Context<Self>) {
        match msg.0 {
            ConnectionState::Disconnected(err) => {
                warn!("Connection lost; failing {} pending commands", self.pending.len());
                let err = err.unwrap_or_else(|| {
                    harvest_transport::TransportError::NotConnected("closed by browser".into())
                });
                self.fail_all(ctx, || InternalError::Transport(err.clone()));
            }
            ConnectionState::FailedToStart(err) => {
                self.fail_all(ctx, || InternalError::Transport(err.clone()));
            }
            _ => {}
        }
    }
}
