use thiserror::Error;

/// Errors surfaced by the connection engine. Authentication failures
/// never reach this layer; the JWT middleware rejects them first.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Not authorized to act on this connection")]
    AuthorizationDenied,

    #[error("Connection not found")]
    NotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),

    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] crate::database::DatabaseError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ConnectionError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        ConnectionError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ConnectionError::Validation(message.into())
    }
}
