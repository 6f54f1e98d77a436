//! Error taxonomy shared by every carve stage.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::models::CarveStatus;

/// Errors raised by the carve pipeline.
///
/// Each variant maps to one failure class: local file-system work, archive
/// and compression, the remote collection service, configuration, and the
/// persisted record.
#[derive(Debug, Error)]
pub enum CarveError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("carve store error: {0}")]
    Store(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: CarveStatus, to: CarveStatus },
}

impl CarveError {
    /// Build an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        CarveError::Io {
            context: context.into(),
            source,
        }
    }

    /// Build an I/O error about a specific path.
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        CarveError::io(format!("Failed to {} {}", action, path.display()), source)
    }

    /// Build a packaging error that keeps the underlying cause in the message.
    pub fn packaging(what: &str, path: &Path, cause: impl std::fmt::Display) -> Self {
        CarveError::Packaging(format!("{} {}: {}", what, path.display(), cause))
    }

    /// Whether this error came from local file-system work.
    pub fn is_io(&self) -> bool {
        matches!(self, CarveError::Io { .. })
    }
}

impl From<serde_json::Error> for CarveError {
    fn from(err: serde_json::Error) -> Self {
        CarveError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_includes_path() {
        let err = CarveError::io_at(
            "open",
            Path::new("/etc/shadow"),
            io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("Failed to open /etc/shadow"));
        assert!(msg.contains("Permission denied"));
        assert!(err.is_io());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CarveError::InvalidTransition {
            from: CarveStatus::Staged,
            to: CarveStatus::Collecting,
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition from STAGED to COLLECTING"
        );
    }
}
