//! # Harvest Transport (raw DevTools connection)
//!
//! Owns the socket to the browser's remote debugging endpoint. The
//! `Transport` trait hides the wire mechanism; `ConnectionActor` runs one
//! transport inside the actor system, forwarding inbound text frames and
//! accepting outbound ones.

pub mod connection;
pub mod error;
pub mod factory;
pub mod traits;
pub mod types;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use connection::{
    ConnectionActor, ConnectionState, ConnectionStatusUpdate, Disconnect, IncomingMessage, SendMessage,
};
pub use error::TransportError;
pub use factory::create_transport;
pub use traits::Transport;
pub use types::ConnectParams;
#[cfg(feature = "websocket")]
pub use types::WebSocketConnectOptions;
