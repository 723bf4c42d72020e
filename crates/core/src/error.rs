//! Error types for Stack Core

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),

    #[error("Invalid meeting code: {0}")]
    InvalidCode(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A direct response is already in progress for {0}")]
    DirectResponseActive(String),

    #[error("Could not allocate a unique meeting code after {0} attempts")]
    CodeCollision(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backend call died without producing a result, e.g. it panicked
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this failure came from reaching the backend rather than from
    /// the request itself. Only these are worth retrying.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_database_is_connection_error() {
        let err = Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_domain_errors_are_not_connection_errors() {
        assert!(!Error::MeetingNotFound("ABC123".into()).is_connection_error());
        assert!(!Error::Validation("empty name".into()).is_connection_error());
        assert!(!Error::Database(rusqlite::Error::QueryReturnedNoRows).is_connection_error());
        assert!(!Error::Internal("task panicked".into()).is_connection_error());
    }
}
