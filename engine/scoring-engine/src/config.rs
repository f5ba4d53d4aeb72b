//! Configuration for the recalculation engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecalcError;

/// How the standings cache is rebuilt after scores are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildStrategy {
    /// Recompute every pair and swap the whole cache
    Full,
    /// Recompute only pairs the episode touched
    Incremental,
}

impl FromStr for RebuildStrategy {
    type Err = RecalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(RebuildStrategy::Full),
            "incremental" => Ok(RebuildStrategy::Incremental),
            other => Err(RecalcError::config(format!("Unknown rebuild strategy: {other}"))),
        }
    }
}

impl fmt::Display for RebuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildStrategy::Full => f.write_str("full"),
            RebuildStrategy::Incremental => f.write_str("incremental"),
        }
    }
}

/// Configuration for the recalculation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Standings rebuild strategy
    pub rebuild_strategy: RebuildStrategy,

    /// Roster rows at or above which scoring fans out across threads
    pub parallel_threshold: usize,

    /// Decimal places kept on calculated points
    pub points_scale: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rebuild_strategy: RebuildStrategy::Full,
            parallel_threshold: crate::DEFAULT_PARALLEL_THRESHOLD,
            points_scale: crate::DEFAULT_POINTS_SCALE,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, RecalcError> {
        let mut config = Self::default();

        if let Ok(strategy) = std::env::var("SCORING_REBUILD_STRATEGY") {
            config.rebuild_strategy = strategy.parse()?;
        }

        if let Ok(threshold) = std::env::var("SCORING_PARALLEL_THRESHOLD") {
            config.parallel_threshold = threshold
                .parse()
                .map_err(|_| RecalcError::config("Invalid SCORING_PARALLEL_THRESHOLD"))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RecalcError> {
        if self.parallel_threshold == 0 {
            return Err(RecalcError::config("parallel_threshold must be greater than 0"));
        }

        if self.points_scale > 10 {
            return Err(RecalcError::config("points_scale must be at most 10"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.rebuild_strategy, RebuildStrategy::Full);
        assert_eq!(config.parallel_threshold, crate::DEFAULT_PARALLEL_THRESHOLD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rebuild_strategy_parsing() {
        assert_eq!("full".parse::<RebuildStrategy>().unwrap(), RebuildStrategy::Full);
        assert_eq!(" Incremental ".parse::<RebuildStrategy>().unwrap(), RebuildStrategy::Incremental);
        assert!(matches!("swap".parse::<RebuildStrategy>(), Err(RecalcError::Config(_))));
        assert_eq!(RebuildStrategy::Incremental.to_string(), "incremental");
    }

    #[test]
    fn test_validation() {
        let config = EngineConfig { parallel_threshold: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = EngineConfig { points_scale: 29, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
