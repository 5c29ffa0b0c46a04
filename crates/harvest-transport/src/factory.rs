//! Picks a `Transport` implementation from the endpoint URL scheme.

use crate::error::TransportError;
use crate::traits::Transport;
use crate::types::ConnectParams;

#[cfg(feature = "websocket")]
use crate::websocket::WebSocketTransport;

pub fn create_transport(params: &ConnectParams) -> Result<Box<dyn Transport>, TransportError> {
    let url = params.url.as_str();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        #[cfg(feature = "websocket")]
        {
            log::debug!("Using WebSocket transport for {}", url);
            Ok(Box::new(WebSocketTransport::new(params.clone())))
        }
        #[cfg(not(feature = "websocket"))]
        {
            Err(TransportError::UnsupportedScheme(
                "ws/wss requires the 'websocket' feature".to_string(),
            ))
        }
    } else {
        Err(TransportError::UnsupportedScheme(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_http_endpoint() {
        let err = create_transport(&ConnectParams::new("http://127.0.0.1:9222")).err();
        assert!(matches!(err, Some(TransportError::UnsupportedScheme(_))));
    }

    #[test]
    fn accepts_ws_endpoint() {
        assert!(create_transport(&ConnectParams::new("ws://127.0.0.1:9222/devtools/browser/a")).is_ok());
    }
}
