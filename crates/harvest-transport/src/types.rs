use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where and how to open the debugging connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectParams {
    /// Full endpoint, e.g. `ws://127.0.0.1:9222/devtools/browser/<id>`.
    pub url: String,

    #[serde(
        rename = "connection_timeout_ms",
        with = "serde_duration_ms",
        default = "default_connect_timeout"
    )]
    pub connection_timeout: Duration,

    #[cfg(feature = "websocket")]
    #[serde(default)]
    pub ws_options: WebSocketConnectOptions,
}

impl ConnectParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout: default_connect_timeout(),
            #[cfg(feature = "websocket")]
            ws_options: WebSocketConnectOptions::default(),
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(20)
}

/// WebSocket frame limits. `None` keeps the tungstenite default.
///
/// `Page.printToPDF` replies carry the whole document base64-encoded, so
/// large resumes need a generous message limit.
#[cfg(feature = "websocket")]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConnectOptions {
    pub max_message_size: Option<usize>,
    pub max_frame_size: Option<usize>,
    pub accept_unmasked_frames: bool,
}

pub(crate) mod serde_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
