//! Error types for vidwatch.
//!
//! Upload failures abort a run before any stream session exists. Connection
//! failures terminate the session without retry. Classifier failures are
//! per-message and never end a session.

use std::time::Duration;

use thiserror::Error;

/// Failure of the one-shot file transfer.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No file was provided, or the file has no content.
    #[error("no file selected")]
    NoFileSelected,

    /// A file was provided but it is not a video.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The selected file could not be read from disk.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// The server answered 2xx but without a usable file reference.
    #[error("malformed upload response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Failure of the streaming channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The stream URL could not be built.
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    /// The connection could not be opened.
    #[error("failed to establish connection: {0}")]
    EstablishFailed(String),

    /// The connection dropped before processing completed.
    #[error("connection closed abnormally: {0}")]
    AbnormalClose(String),

    /// No inbound message arrived within the configured stall timeout.
    #[error("no message from server for {0:?}")]
    Stalled(Duration),
}

/// Failure to interpret one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    /// Text frame that is not valid JSON.
    #[error("malformed status message: {0}")]
    MalformedJson(String),

    /// Valid JSON that is neither a progress nor a completion message.
    #[error("unknown status message: {0}")]
    UnknownStatus(String),
}

/// Failure of a whole run, as reported by [`crate::client::Client::run`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

pub type Result<T, E = RunError> = std::result::Result<T, E>;
