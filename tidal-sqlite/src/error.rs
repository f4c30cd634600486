//! Error types for SQLite handle operations.

use thiserror::Error;

/// Result type for SQLite handle operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite handle operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A statement failed or was rejected before reaching the driver.
    #[error("Statement error: {0}")]
    Statement(String),

    /// Transaction control error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A setup stage failed while activating a handle.
    #[error("Activation of '{stage}' failed: {message}")]
    Activation {
        /// Name of the failing stage.
        stage: String,
        /// Failure description.
        message: String,
    },

    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),
}

impl SqliteError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a statement error.
    pub fn statement(msg: impl Into<String>) -> Self {
        Self::Statement(msg.into())
    }

    /// Create a transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Create an activation error.
    pub fn activation(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Activation {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Create a pool error.
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }
}
