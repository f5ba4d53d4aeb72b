//! Error types for the scoring recalculation engine

use league_store::{EpisodeNumber, StoreError};
use thiserror::Error;

/// Result type for recalculation operations
pub type Result<T> = std::result::Result<T, RecalcError>;

/// Errors that can end a recalculation run
#[derive(Error, Debug)]
pub enum RecalcError {
    /// Invalid configuration or operator override
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading rosters, settings or box scores failed; nothing was written
    #[error("Aggregation failed for episode {episode}: {source}")]
    Aggregation {
        episode: EpisodeNumber,
        #[source]
        source: StoreError,
    },

    /// Writing episode scores failed; the batch was rolled back
    #[error("Persisting scores for episode {episode} failed: {source}")]
    Persistence {
        episode: EpisodeNumber,
        #[source]
        source: StoreError,
    },

    /// Rebuilding standings failed; the published cache is unchanged
    #[error("Standings rebuild failed: {source}")]
    Rebuild {
        #[source]
        source: StoreError,
    },

    /// Another run for the same episode is in flight
    #[error("Recalculation for episode {episode} is already in flight")]
    Concurrency { episode: EpisodeNumber },
}

impl RecalcError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short label used in logs and run results
    pub fn kind(&self) -> &'static str {
        match self {
            RecalcError::Config(_) => "config",
            RecalcError::Aggregation { .. } => "aggregation",
            RecalcError::Persistence { .. } => "persistence",
            RecalcError::Rebuild { .. } => "rebuild",
            RecalcError::Concurrency { .. } => "concurrency",
        }
    }
}
