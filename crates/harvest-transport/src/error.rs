use thiserror::Error;

/// Failures of the raw connection to the debugging endpoint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[cfg(feature = "websocket")]
    #[error("WebSocket protocol error: {0}")]
    WebSocket(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                TransportError::NotConnected("socket closed".into())
            }
            WsError::Io(io_err) => TransportError::Io(io_err.to_string()),
            WsError::Tls(tls_err) => TransportError::Tls(tls_err.to_string()),
            WsError::Capacity(reason) => TransportError::SendFailed(format!("capacity: {}", reason)),
            WsError::Protocol(reason) => TransportError::WebSocket(reason.to_string()),
            WsError::WriteBufferFull(_) => TransportError::SendFailed("write buffer full".into()),
            WsError::Utf8 => TransportError::ReceiveFailed("invalid UTF-8 frame".into()),
            WsError::Url(reason) => TransportError::InvalidUrl(reason.to_string()),
            WsError::Http(resp) => TransportError::ConnectionFailed(format!(
                "handshake rejected with HTTP {}",
                resp.status()
            )),
            WsError::HttpFormat(http_err) => {
                TransportError::ConnectionFailed(format!("bad handshake: {}", http_err))
            }
            other => TransportError::Other(other.to_string()),
        }
    }
}
