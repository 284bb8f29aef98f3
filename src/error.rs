//! Error types for auditor-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using auditor-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification carried across the UI boundary.
///
/// Every [`Error`] maps to exactly one kind; the presentation layer branches
/// on the kind while the message stays human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid configuration detected before a session starts.
    Configuration,
    /// Read/write failure against the filesystem or a database.
    Io,
    /// Report-format incompatibility (triggers CSV failover).
    Format,
    /// Corrupted session file, identifier collision, queue/log mismatch.
    StateIntegrity,
    /// Rejected command input; state unchanged.
    UserInput,
    /// Programmer error or unexpected internal condition.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Io => "io",
            Self::Format => "format",
            Self::StateIntegrity => "state_integrity",
            Self::UserInput => "user_input",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Errors that can occur during review-session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Adapter used before configuration completed
    #[error("Data source is not configured: {0}")]
    NotConfigured(String),

    /// Adapter inventory is empty
    #[error("No code pairs found in data source: {0}")]
    NoPairsFound(String),

    /// Two inventory entries share an identifier
    #[error("Ambiguous identifier in data source: {identifier}")]
    AmbiguousIdentifiers { identifier: String },

    /// Reading a code body failed
    #[error("Failed to read {identifier}: {reason}")]
    ReadFailed { identifier: String, reason: String },

    /// Invalid session or adapter configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(String),

    /// Spreadsheet read/write failure
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session file exists but cannot be interpreted
    #[error("Corrupted session {session_id}: {reason}")]
    CorruptedSession { session_id: String, reason: String },

    /// Report writer used before `init_report`
    #[error("Report writer is not initialized")]
    NotInitialized,

    /// Target filesystem denied the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Target filesystem is out of space
    #[error("Disk full while writing {0}")]
    DiskFull(String),

    /// Report backend rejected the payload; failover to CSV is expected
    #[error("Report format incompatibility: {0}")]
    FormatIncompatible(String),

    /// Verdict id is not part of the configured vocabulary
    #[error("Invalid verdict id: {0}")]
    InvalidVerdict(String),

    /// Review comment exceeds the limit or contains NUL
    #[error("Comment rejected: {0}")]
    InvalidComment(String),

    /// Undo requested with no completed reviews
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Verdict or flag submitted with no pair under review
    #[error("No code pair is loaded")]
    NoPairLoaded,

    /// Command rejected because the session is paused
    #[error("Session is paused")]
    SessionPaused,

    /// Command requires an active session
    #[error("No active session")]
    SessionNotActive,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a read failure for a specific pair.
    pub fn read_failed(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create an ambiguous-identifier error.
    pub fn ambiguous(identifier: impl Into<String>) -> Self {
        Self::AmbiguousIdentifiers {
            identifier: identifier.into(),
        }
    }

    /// Create a corrupted-session error.
    pub fn corrupted(session_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptedSession {
            session_id: session_id.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error for the UI-bound event surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured(_) | Self::Config(_) | Self::NoPairsFound(_) => {
                ErrorKind::Configuration
            }
            Self::AmbiguousIdentifiers { .. } => ErrorKind::StateIntegrity,
            Self::ReadFailed { .. }
            | Self::Io(_)
            | Self::Database(_)
            | Self::PermissionDenied(_)
            | Self::DiskFull(_) => ErrorKind::Io,
            Self::Spreadsheet(_) | Self::FormatIncompatible(_) => ErrorKind::Format,
            Self::Serialization(_) | Self::CorruptedSession { .. } => ErrorKind::StateIntegrity,
            Self::NotInitialized => ErrorKind::Internal,
            Self::InvalidVerdict(_)
            | Self::InvalidComment(_)
            | Self::NothingToUndo
            | Self::NoPairLoaded
            | Self::SessionPaused
            | Self::SessionNotActive => ErrorKind::UserInput,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Map an I/O error to the most specific report-writer variant.
    pub(crate) fn from_report_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Self::PermissionDenied(path.display().to_string())
            }
            _ if err.raw_os_error() == Some(28) => Self::DiskFull(path.display().to_string()),
            _ => Self::Io(err),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}
