//! `Transport` over a WebSocket (`tokio-tungstenite`).

use crate::error::TransportError;
use crate::traits::Transport;
use crate::types::{ConnectParams, WebSocketConnectOptions};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async_with_config,
    tungstenite::{
        Error as WsError,
        protocol::{Message as WsMessage, WebSocketConfig},
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

pub struct WebSocketTransport {
    params: ConnectParams,
    sink: Option<WsSink>,
    source: Option<WsSource>,
}

impl WebSocketTransport {
    pub fn new(params: ConnectParams) -> Self {
        Self {
            params,
            sink: None,
            source: None,
        }
    }

    fn socket_config(options: &WebSocketConnectOptions) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        if let Some(size) = options.max_message_size {
            config.max_message_size = Some(size);
        }
        if let Some(size) = options.max_frame_size {
            config.max_frame_size = Some(size);
        }
        config.accept_unmasked_frames = options.accept_unmasked_frames;
        config
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.sink.is_some() {
            return Err(TransportError::ConnectionFailed("already connected".into()));
        }

        info!("Opening DevTools socket {}", self.params.url);
        let config = Self::socket_config(&self.params.ws_options);
        let (stream, response) =
            connect_async_with_config(self.params.url.as_str(), Some(config), false).await?;
        debug!("Handshake status: {}", response.status());

        let (sink, source) = stream.split();
        self.sink = Some(sink);
        self.source = Some(source);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.source = None;
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        match sink.send(WsMessage::Close(None)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {}
            Err(e) => warn!("Close frame not delivered: {}", e),
        }
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected("socket not open".into()))?;
        sink.send(WsMessage::Text(message.to_string())).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Option<Result<String, TransportError>> {
        let source = self.source.as_mut()?;
        loop {
            match source.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        return Some(Err(TransportError::ReceiveFailed(
                            "non UTF-8 binary frame".into(),
                        )));
                    }
                },
                // tungstenite answers pings while the stream is polled
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {
                    continue;
                }
                Ok(WsMessage::Close(frame)) => {
                    info!("DevTools socket closed by browser: {:?}", frame);
                    return None;
                }
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
