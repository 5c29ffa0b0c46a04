use crate::error::TransportError;
use async_trait::async_trait;

/// A bidirectional text-message channel to a debugging endpoint.
#[async_trait]
pub trait Transport: Send + Unpin {
    /// Opens the connection described by the parameters given at construction.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Closes the connection. Safe to call on an already closed transport.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Next inbound text message.
    ///
    /// Control frames are consumed internally. `None` means the remote side
    /// closed the connection.
    async fn receive(&mut self) -> Option<Result<String, TransportError>>;
}
