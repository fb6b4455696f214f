//! Error types for the broker.
//!
//! Frame errors are recovered inside a session and reported to the sender.
//! Persistence errors reject a publish or leave a message queued for retry.
//! `BrokerError::Fatal` is reserved for listener failures that end the server.

use std::io;
use std::path::PathBuf;

/// A frame that could not be turned into a protocol message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unrecognized frame: {0}")]
    ProtocolViolation(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("frame exceeds {0} bytes")]
    TooLong(usize),

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Disk failures in the durable log.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl PersistenceError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        PersistenceError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Application-level errors for sessions and the server.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("delivery of {id} was not acknowledged within {timeout_ms} ms")]
    DeliveryTimeout { id: String, timeout_ms: u64 },

    #[error("message {id} is already outstanding on topic {topic}")]
    DuplicateId { topic: String, id: String },

    #[error("topic store is no longer running")]
    StoreClosed,

    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    #[error("fatal listener error: {0}")]
    Fatal(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
