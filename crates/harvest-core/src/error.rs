use harvest_transport::TransportError;
use thiserror::Error;

/// Errors raised inside the client machinery, below the public `ApiError`.
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command was answered with a CDP error object.
    #[error("Protocol error: {message}")]
    Protocol {
        code: Option<i64>,
        message: String,
        data: Option<String>,
    },

    /// Mailbox failures and actors that went away mid-request.
    #[error("Actor system error: {0}")]
    Actor(String),

    #[error("Command timed out")]
    Timeout,

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors from the core crate's own helpers.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration loading failed: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Logging setup failed: {0}")]
    LoggingSetup(String),
}

impl From<CoreError> for InternalError {
    fn from(err: CoreError) -> Self {
        InternalError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for InternalError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            InternalError::Deserialization(err.to_string())
        } else {
            InternalError::Serialization(err.to_string())
        }
    }
}
