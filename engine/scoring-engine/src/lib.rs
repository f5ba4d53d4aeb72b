//! # Scoring Engine
//!
//! Converts raw per-episode contestant points into league-specific,
//! rank-weighted user scores and republishes season standings.
//!
//! A run for one episode:
//! 1. resolves the rank multiplier table from settings (plus any operator override)
//! 2. snapshots the episode's rosters and sums raw box scores
//! 3. weighs every roster pick: `raw points * multiplier(rank)`
//! 4. persists the scores as one idempotent batch
//! 5. rebuilds the standings cache atomically

pub mod aggregator;
pub mod calculator;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod multiplier;
pub mod standings;


pub use aggregator::RawPoints;
pub use calculator::ScoreCalculator;
pub use config::{EngineConfig, RebuildStrategy};
pub use engine::{RecalcEngine, RunPhase, RunReport, RunResult, RunStatus};
pub use error::{RecalcError, Result};
pub use guard::{EpisodeGuard, EpisodeLease};
pub use metrics::{RunMetrics, RunMetricsSnapshot};
pub use multiplier::{ConfigIssue, MultiplierOverride, MultiplierTable};
pub use standings::StandingsRebuilder;

/// Re-export commonly used store types
pub use league_store::{EpisodeNumber, LeagueStore, Rank};

/// Roster rows at which scoring moves onto the rayon pool
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 512;

/// Decimal places kept on calculated points
pub const DEFAULT_POINTS_SCALE: u32 = 2;
