//! Error types for the league store

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while reading or writing league data
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database errors (connection, query, constraint)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Contestant name failed boundary validation
    #[error("Invalid contestant name: {0}")]
    InvalidContestant(String),

    /// Roster submission failed validation
    #[error("Invalid roster: {0}")]
    InvalidRoster(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid operation for the given input
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Create a new contestant validation error
    pub fn invalid_contestant(msg: impl Into<String>) -> Self {
        Self::InvalidContestant(msg.into())
    }

    /// Create a new roster validation error
    pub fn invalid_roster(msg: impl Into<String>) -> Self {
        Self::InvalidRoster(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create a new unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
