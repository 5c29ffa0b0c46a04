//! # Harvest Protocol
//!
//! CDP JSON-RPC over the transport: command ids, replies, timeouts and
//! event dispatch.

pub mod command_actor;
pub mod event_actor;
pub mod messages;

pub use command_actor::CommandActor;
pub use event_actor::{EventActor, EventSubscription};
pub use messages::{CommandResult, ProtocolEvent, SendCommand, Subscribe, Unsubscribe, execute};
