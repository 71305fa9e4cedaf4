//! Error types and handling infrastructure for logscan.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. The binary layers `anyhow` on top for context.
//!
//! Cancellation is deliberately absent: a cancelled indexing operation is an
//! [`OperationResult`](crate::indexing::OperationResult), not an error.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for logscan operations.
#[derive(Error, Debug)]
pub enum LogscanError {
    /// File system related errors (unreadable file, permission revoked, etc.)
    #[error("File operation failed: {message}")]
    FileError {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// File not found specifically (common case for user feedback)
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A search pattern was rejected by every available engine
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A line number past the end of the index was requested
    #[error("Line {line} is out of range (index holds {line_count} lines)")]
    LineOutOfRange { line: u64, line_count: u64 },

    /// An indexing operation was scheduled before a file was attached
    #[error("No file attached to the indexing worker")]
    NoFileAttached,

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

/// Standard Result type for logscan operations.
pub type Result<T> = std::result::Result<T, LogscanError>;

impl LogscanError {
    /// Create a FileError from an io::Error with additional context
    pub fn file_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileError {
            message: message.into(),
            source,
        }
    }

    /// Create an InvalidPattern error for the given pattern text
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a ConfigError with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

// Automatic conversion from io::Error to LogscanError
impl From<std::io::Error> for LogscanError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                // The path is not known here; the line filter builds
                // FileNotFound itself.
                Self::FileError {
                    message: "File not found".to_string(),
                    source: err,
                }
            }
            std::io::ErrorKind::PermissionDenied => Self::FileError {
                message: "Permission denied".to_string(),
                source: err,
            },
            _ => Self::FileError {
                message: "IO operation failed".to_string(),
                source: err,
            },
        }
    }
}
