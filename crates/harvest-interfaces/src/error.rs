use thiserror::Error;

/// Errors surfaced by the `Browser` and `Page` handles.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The debugging endpoint could not be reached or the socket dropped.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation did not finish within its bound.
    #[error("Operation timed out")]
    Timeout,

    /// The browser rejected a command or answered with something unexpected.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// A script evaluated in the page threw.
    #[error("Script error: {0}")]
    ScriptError(String),

    /// The tab went away while it was being used.
    #[error("Tab closed or detached")]
    TargetClosed,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Internal client error: {0}")]
    InternalError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::IoError(err.to_string())
    }
}
