//! Error types for Tubetap Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for interceptor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Interceptor error types
#[derive(Error, Debug)]
pub enum Error {
    // Manifest errors
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    // Collaborator errors
    #[error("Metadata unavailable for {video_id}: {reason}")]
    Metadata { video_id: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classification carried by [`crate::MediaEvent::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedManifest,
    StreamUnavailable,
    Metadata,
    Config,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::MalformedManifest => write!(f, "malformed manifest"),
            ErrorKind::StreamUnavailable => write!(f, "stream unavailable"),
            ErrorKind::Metadata => write!(f, "metadata"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Create a malformed manifest error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedManifest(msg.into())
    }

    /// Create a stream unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::StreamUnavailable(msg.into())
    }

    /// Returns true if the failure belongs to the manifest task and is
    /// reported to the user as a one-shot notice
    pub fn is_notice_worthy(&self) -> bool {
        matches!(
            self,
            Error::MalformedManifest(_) | Error::StreamUnavailable(_) | Error::Io(_)
        )
    }

    /// Coarse classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedManifest(_) => ErrorKind::MalformedManifest,
            Error::StreamUnavailable(_) | Error::Io(_) => ErrorKind::StreamUnavailable,
            Error::Metadata { .. } => ErrorKind::Metadata,
            Error::InvalidConfig(_) | Error::Json(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the error code for notices and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MalformedManifest(_) => "MALFORMED_MANIFEST",
            Error::StreamUnavailable(_) => "STREAM_UNAVAILABLE",
            Error::Metadata { .. } => "METADATA",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}
