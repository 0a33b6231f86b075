use thiserror::Error;

use crate::models::ApplicationId;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Everything the tracker can fail with. None of these are fatal: the
/// in-memory list is left exactly as it was before the failing call.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// A mutation was attempted with no wallet connected
    #[error("not authenticated: connect a wallet first")]
    NotAuthenticated,

    /// Required fields missing or malformed before reaching the store
    #[error("validation error: {0}")]
    Validation(String),

    /// The record store rejected or could not service the request
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No row matched both the id and the caller's wallet
    #[error("application {id} not found")]
    NotFound { id: ApplicationId },

    #[error("database not initialized: {0}")]
    Schema(String),
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Persistence(PersistenceError::Sqlite(err))
    }
}

impl TrackerError {
    pub fn not_found(id: &ApplicationId) -> Self {
        TrackerError::Persistence(PersistenceError::NotFound { id: id.clone() })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, TrackerError::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_errors_become_persistence() {
        let err: TrackerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_persistence());
        assert!(err.to_string().starts_with("database error"));
    }

    #[test]
    fn test_not_found_message_names_id() {
        let err = TrackerError::not_found(&ApplicationId::from("abc123"));
        assert!(err.is_persistence());
        assert_eq!(err.to_string(), "application abc123 not found");
    }

    #[test]
    fn test_not_authenticated_is_not_persistence() {
        assert!(!TrackerError::NotAuthenticated.is_persistence());
        assert!(!TrackerError::Validation("x".into()).is_persistence());
    }
}
