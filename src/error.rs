//! Error kinds shared across the crate.
//!
//! Every kind here corresponds to one of the "Kinds" in the core design: a
//! session fatal error tears the session down, a command fatal error ends
//! only the command that produced it, and the rest are logged and the
//! offending line or file is dropped.

use std::path::PathBuf;

/// What a caller should do in response to a `CoreError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Close the whole session; nothing further can be trusted.
    FatalSession,
    /// Abandon the command that raised this error; the session continues.
    FatalCommand,
    /// Retry per the caller's retry policy.
    Retry,
    /// Log the error and drop the line/file/message that triggered it.
    LogAndDrop,
}

/// The error kinds a dtail server or client can raise.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The peer's protocol version does not match ours.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    ProtocolMismatch {
        /// The version we require.
        expected: String,
        /// The version the peer sent.
        got: String,
    },

    /// The permission oracle refused a path for a user.
    #[error("permission denied for user {user} on {}", path.display())]
    PermissionDenied {
        /// The user the check was performed for.
        user: String,
        /// The path that was denied.
        path: PathBuf,
    },

    /// A glob pattern matched zero files.
    #[error("glob {pattern} matched no files")]
    GlobEmpty {
        /// The pattern that failed to match.
        pattern: String,
    },

    /// The query or command text could not be parsed.
    #[error("parse error: {0}")]
    ParseError(String),

    /// An I/O error occurred while reading a file.
    #[error("reader I/O error on {}: {source}", path.display())]
    ReaderIo {
        /// The file being read when the error occurred.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A processor failed to handle a line.
    #[error("processor error: {0}")]
    ProcessorError(String),

    /// The aggregate engine failed to fold a line into a group.
    #[error("aggregate error: {0}")]
    AggregateError(String),

    /// An output channel was full and a line had to be dropped.
    #[error("channel full, dropping line")]
    ChannelFull,
}

impl CoreError {
    /// The action a caller should take upon observing this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            CoreError::ProtocolMismatch { .. } => Disposition::FatalSession,
            CoreError::PermissionDenied { .. } => Disposition::LogAndDrop,
            CoreError::GlobEmpty { .. } => Disposition::Retry,
            CoreError::ParseError(_) => Disposition::FatalCommand,
            CoreError::ReaderIo { .. } => Disposition::Retry,
            CoreError::ProcessorError(_) => Disposition::LogAndDrop,
            CoreError::AggregateError(_) => Disposition::LogAndDrop,
            CoreError::ChannelFull => Disposition::LogAndDrop,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
