//! Errors raised by the jobs, the stores and the launch sequence.

use harvest_core::error::CoreError;
use harvest_interfaces::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration loading failed: {0}")]
    ConfigError(#[from] CoreError),

    #[error("Actor system failed to start: {0}")]
    ActorSystemError(String),

    /// The DevTools endpoint could not be found or reached.
    #[error("Could not connect to the browser: {0}")]
    ConnectError(String),

    #[error("Supervisor actor failed: {0}")]
    SupervisorError(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Failures of the persisted key/value state.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),

    #[error("State store lock poisoned")]
    Poisoned,
}

/// Failures while writing an exported PDF.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid download path: {0}")]
    InvalidPath(String),

    #[error("Writing the file failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download did not complete in time")]
    Timeout,
}

/// A single target failed. Recorded in the job report; the batch goes on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetError {
    #[error("Script failed: {0}")]
    Script(String),

    #[error("{0}")]
    Extraction(String),

    #[error("Timed out waiting for the page to load")]
    LoadTimeout,

    #[error("Tab was closed while it was being processed")]
    TabClosed,

    #[error("Print returned no data; the page may not have rendered yet")]
    EmptyPdf,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Saving the record failed: {0}")]
    Storage(String),

    #[error("Browser error: {0}")]
    Protocol(String),
}

impl From<ApiError> for TargetError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::ScriptError(msg) => TargetError::Script(msg),
            ApiError::TargetClosed => TargetError::TabClosed,
            other => TargetError::Protocol(other.to_string()),
        }
    }
}

impl From<ExportError> for TargetError {
    fn from(err: ExportError) -> Self {
        TargetError::Download(err.to_string())
    }
}

impl From<StoreError> for TargetError {
    fn from(err: StoreError) -> Self {
        TargetError::Storage(err.to_string())
    }
}

/// Job-level failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("a job is already running")]
    Busy,

    /// Nothing could be processed; the job ends before the first target.
    #[error("{0}")]
    Setup(String),

    #[error("stopped")]
    Stopped,
}

impl From<ApiError> for JobError {
    fn from(err: ApiError) -> Self {
        JobError::Setup(err.to_string())
    }
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::Setup(err.to_string())
    }
}
