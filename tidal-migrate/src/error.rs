//! Error types for the migration engine.

use thiserror::Error;
use tidal_sqlite::SqliteError;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur while configuring or running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database operation error.
    #[error("Database error: {0}")]
    Database(#[from] SqliteError),

    /// A migration descriptor is malformed.
    #[error("Invalid migration for '{table}': {reason}")]
    InvalidInfo {
        /// Target table of the offending descriptor.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two descriptors migrate into the same target table.
    #[error("Table '{0}' is already registered for migration")]
    DuplicateTarget(String),
}

impl MigrationError {
    /// Create an invalid descriptor error.
    pub fn invalid_info(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInfo {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

impl From<MigrationError> for SqliteError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Database(e) => e,
            other => SqliteError::config(other.to_string()),
        }
    }
}
