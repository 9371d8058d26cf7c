// src/error.rs
use quire_traits::{EngineError, FetchError, FsError};
use thiserror::Error;

/// A comprehensive error type for a compile session.
///
/// Every variant is terminal for the job it occurs in. At the job boundary
/// the error is rendered with `Display` and travels as the message of an
/// `error` event.
#[derive(Error, Debug)]
pub enum QuireError {
    /// A user-supplied file could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The engine aborted or could not be instantiated.
    #[error("{0}")]
    Abort(String),

    #[error("output.pdf not found (expected at {0})")]
    OutputMissing(String),

    #[error("private filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("the compile worker is no longer running")]
    WorkerClosed,

    #[error("no rendered document is available")]
    NoOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for QuireError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Fs(fs) => QuireError::Fs(fs),
            other => QuireError::Abort(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for QuireError {
    fn from(err: tokio::task::JoinError) -> Self {
        QuireError::Abort(format!("blocking task failed: {}", err))
    }
}
