//! Error mapping for the Chrome implementation.

use harvest_core::InternalError;
use harvest_interfaces::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChromeError {
    /// The DevTools HTTP endpoint was unreachable or answered badly.
    #[error("DevTools discovery failed: {0}")]
    Discovery(String),

    /// `Runtime.evaluate` reported an exception.
    #[error("Script threw: {0}")]
    Script(String),

    #[error("Tab {0} closed")]
    TargetClosed(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Malformed PDF payload: {0}")]
    PdfData(String),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl ChromeError {
    /// The tab or its session no longer exists.
    pub fn is_target_gone(&self) -> bool {
        match self {
            ChromeError::TargetClosed(_) => true,
            ChromeError::Internal(InternalError::Protocol { message, .. }) => is_gone(message),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ChromeError {
    fn from(err: serde_json::Error) -> Self {
        ChromeError::Internal(err.into())
    }
}

impl From<ChromeError> for ApiError {
    fn from(err: ChromeError) -> Self {
        match err {
            ChromeError::Discovery(msg) => ApiError::ConnectionFailed(msg),
            ChromeError::Script(msg) => ApiError::ScriptError(msg),
            ChromeError::TargetClosed(_) => ApiError::TargetClosed,
            ChromeError::Timeout(_) => ApiError::Timeout,
            ChromeError::PdfData(msg) => ApiError::ProtocolError(msg),
            ChromeError::Internal(e) => map_internal_to_api_error(e),
        }
    }
}

pub(crate) fn map_internal_to_api_error(err: InternalError) -> ApiError {
    match err {
        InternalError::Transport(e) => ApiError::ConnectionFailed(e.to_string()),
        InternalError::Protocol { message, .. } if is_gone(&message) => ApiError::TargetClosed,
        InternalError::Protocol { message, .. } => ApiError::ProtocolError(message),
        InternalError::Actor(msg) => ApiError::InternalError(format!("actor: {}", msg)),
        InternalError::Timeout => ApiError::Timeout,
        InternalError::InvalidParams(msg) => ApiError::InvalidParameters(msg),
        InternalError::Serialization(msg) | InternalError::Deserialization(msg) => {
            ApiError::ProtocolError(format!("unexpected payload: {}", msg))
        }
        InternalError::Configuration(msg) => ApiError::InternalError(msg),
    }
}

// Chrome's wording when a target or session no longer exists.
fn is_gone(message: &str) -> bool {
    message.contains("No target with given id")
        || message.contains("No session with given id")
        || message.contains("Session with given id not found")
        || message.contains("Target closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_target_maps_to_target_closed() {
        let err = InternalError::Protocol {
            code: Some(-32602),
            message: "No target with given id found".into(),
            data: None,
        };
        assert_eq!(map_internal_to_api_error(err), ApiError::TargetClosed);
    }

    #[test]
    fn other_protocol_errors_keep_message() {
        let err = InternalError::Protocol {
            code: Some(-32000),
            message: "Printing failed".into(),
            data: None,
        };
        assert_eq!(
            map_internal_to_api_error(err),
            ApiError::ProtocolError("Printing failed".into())
        );
    }
}
