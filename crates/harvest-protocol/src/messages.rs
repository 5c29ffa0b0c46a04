//! Messages exchanged with the protocol actors and the JSON-RPC wire shapes.

use actix::prelude::*;
use futures_channel::oneshot;
use harvest_core::InternalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Executes one CDP command. The outcome arrives on `result_tx`; the message
/// result only says whether the command was accepted.
#[derive(Debug)]
pub struct SendCommand {
    /// Flattened session id for page-level commands, `None` for browser-level.
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
    /// Overrides the actor's default command timeout.
    pub timeout: Option<Duration>,
    pub result_tx: oneshot::Sender<CommandResult>,
}

impl Message for SendCommand {
    type Result = Result<(), InternalError>;
}

pub type CommandResult = Result<Value, InternalError>;

/// Sends a command through `commands` and waits for its reply.
pub async fn execute(
    commands: &Recipient<SendCommand>,
    session_id: Option<String>,
    method: &str,
    params: Value,
    timeout: Option<Duration>,
) -> CommandResult {
    let (result_tx, result_rx) = oneshot::channel();
    commands
        .send(SendCommand {
            session_id,
            method: method.to_string(),
            params,
            timeout,
            result_tx,
        })
        .await
        .map_err(|e| InternalError::Actor(format!("command actor mailbox: {}", e)))??;
    result_rx
        .await
        .map_err(|_| InternalError::Actor(format!("reply channel for {} dropped", method)))?
}

/// An event pushed by the browser.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct ProtocolEvent {
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
}

/// Routes events named `event_name` to `subscriber`. A `None` session
/// receives the event for every session.
#[derive(Debug, Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub event_name: String,
    pub session_id: Option<String>,
    pub subscriber: Recipient<ProtocolEvent>,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub event_name: String,
    pub session_id: Option<String>,
    pub subscriber: Recipient<ProtocolEvent>,
}

#[derive(Debug, Message)]
#[rtype(result = "()")]
pub(crate) struct CommandTimeout(pub i64);

#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub method: String,
    pub result_tx: oneshot::Sender<CommandResult>,
    pub timeout_handle: SpawnHandle,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonRpcRequest<'a> {
    pub id: i64,
    pub method: &'a str,
    pub params: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any inbound frame: a reply when `id` is set, an event when `method` is.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IncomingJson {
    pub id: Option<i64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub session_id: Option<String>,
}
