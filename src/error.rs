use thiserror::Error;

/// Main error type for the contact affinity engine
#[derive(Error, Debug)]
pub enum AffinityError {
    /// Rejected input (bad multiplier, unknown edge type, empty seed set)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operating on a tenant or backend that is not configured
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage layer unreachable or query execution error
    #[error("Backend failure: {0}")]
    Backend(String),

    /// SQLite errors raised by the indexed backend
    #[error("Backend failure: database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Backend factory could not initialize
    #[error("Configuration failure: {0}")]
    Configuration(String),
}

impl AffinityError {
    /// True for errors raised by the storage layer itself.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, AffinityError::Backend(_) | AffinityError::Database(_))
    }
}

/// Convenient Result type using AffinityError
pub type Result<T> = std::result::Result<T, AffinityError>;
