use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::ErrorKind;

/// type alias for all operations on a [`RecordStore`] (and friends) that could fail with a
/// [`FortuneError`]
///
/// [`RecordStore`]: ./struct.RecordStore.html
pub type Result<T> = std::result::Result<T, FortuneError>;

/// The Error variants used throughout the fortune crate.
///
/// Every variant maps onto one of the stable wire [`ErrorKind`]s (see [`FortuneError::kind`]),
/// which is what a client actually gets to see.
#[derive(Debug, Error)]
pub enum FortuneError {
    /// a `read` was issued against a store holding no fortunes
    #[error("the fortune database is empty")]
    EmptyStore,

    /// a fortune could not be appended to the backing file
    #[error("could not persist fortune to {path:?}: {source}")]
    Persistence {
        /// the backing file being written
        path: PathBuf,
        /// the underlying I/O failure
        source: io::Error,
    },

    /// the request named a method outside of the closed method set
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// the request arguments do not fit the requested method
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// the request payload could not be decoded
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// I/O failure on a client connection
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// the store lock could not be acquired within the configured bound
    #[error("timed out after {0:?} waiting for the database lock")]
    LockTimeout(Duration),

    /// local file I/O, e.g. while loading the backing file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization failure outside of request decoding
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// an error envelope returned by a fortune server
    #[error("{name}: {message}")]
    Remote {
        /// the error kind reported by the server
        name: ErrorKind,
        /// the server's description of the error
        message: String,
    },

    /// catch-all for errors that only carry a description
    #[error("{0}")]
    StringErr(String),
}

impl FortuneError {
    /// returns the wire [`ErrorKind`] that this error is reported as
    pub fn kind(&self) -> ErrorKind {
        match self {
            FortuneError::EmptyStore => ErrorKind::EmptyStore,
            FortuneError::Persistence { .. } | FortuneError::Io(_) => ErrorKind::PersistenceError,
            FortuneError::UnknownMethod(_) => ErrorKind::UnknownMethod,
            FortuneError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            FortuneError::MalformedRequest(_) | FortuneError::Json(_) => {
                ErrorKind::MalformedRequest
            }
            FortuneError::Transport(_) => ErrorKind::TransportError,
            FortuneError::LockTimeout(_) => ErrorKind::LockTimeout,
            FortuneError::Remote { name, .. } => *name,
            FortuneError::StringErr(_) => ErrorKind::InternalError,
        }
    }
}
