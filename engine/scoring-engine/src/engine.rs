//! Recalculation orchestrator

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use league_store::{EpisodeNumber, LeagueStore};

use crate::aggregator;
use crate::calculator::ScoreCalculator;
use crate::config::EngineConfig;
use crate::error::{RecalcError, Result};
use crate::guard::EpisodeGuard;
use crate::metrics::{RunMetrics, RunMetricsSnapshot};
use crate::multiplier::{self, ConfigIssue, MultiplierOverride};
use crate::standings::StandingsRebuilder;

/// Phases of one recalculation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    ResolvingConfig,
    Aggregating,
    Calculating,
    Persisting,
    Rebuilding,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal status reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    Failed,
    Rejected,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub episode: EpisodeNumber,
    pub roster_rows: usize,
    pub rows_updated: usize,
    pub rows_removed: usize,
    pub standings_updated: usize,
    pub config_issues: Vec<ConfigIssue>,
}

/// Outcome of `recalculate`, successful or not
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub episode: EpisodeNumber,
    pub status: RunStatus,
    /// Terminal phase: `Done`, `Failed`, or `Idle` for a rejected run
    pub phase: RunPhase,
    /// Phase that was executing when the run failed
    pub failed_during: Option<RunPhase>,
    pub rows_updated: usize,
    pub rows_removed: usize,
    pub standings_updated: usize,
    pub config_issues: Vec<ConfigIssue>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

struct PhaseTracker {
    episode: EpisodeNumber,
    phase: RunPhase,
}

impl PhaseTracker {
    fn new(episode: EpisodeNumber) -> Self {
        Self { episode, phase: RunPhase::Idle }
    }

    fn advance(&mut self, next: RunPhase) {
        tracing::debug!("Episode {}: {} -> {}", self.episode, self.phase, next);
        self.phase = next;
    }
}

/// Runs episode recalculations against a league store.
///
/// One run resolves multipliers, snapshots the episode's rosters, scores
/// them, persists the scores as one batch and republishes standings. A run
/// holds its episode for its whole duration; a second run for the same
/// episode is rejected.
pub struct RecalcEngine {
    store: Arc<dyn LeagueStore>,
    config: EngineConfig,
    calculator: ScoreCalculator,
    rebuilder: StandingsRebuilder,
    guard: EpisodeGuard,
    metrics: Arc<RunMetrics>,
}

impl RecalcEngine {
    /// Create a new engine over the given store
    pub fn new(store: Arc<dyn LeagueStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            "Creating RecalcEngine ({} rebuild, parallel at {} rows)",
            config.rebuild_strategy,
            config.parallel_threshold
        );

        Ok(Self {
            calculator: ScoreCalculator::new(config.parallel_threshold, config.points_scale),
            rebuilder: StandingsRebuilder::new(config.rebuild_strategy),
            guard: EpisodeGuard::new(),
            metrics: Arc::new(RunMetrics::new()),
            store,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LeagueStore> {
        &self.store
    }

    pub fn guard(&self) -> &EpisodeGuard {
        &self.guard
    }

    pub fn metrics(&self) -> RunMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Recalculate an episode and report the outcome without returning an error
    pub async fn recalculate(
        &self,
        episode: EpisodeNumber,
        overrides: Option<&MultiplierOverride>,
    ) -> RunResult {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut tracker = PhaseTracker::new(episode);

        let outcome = self.run(episode, overrides, &mut tracker).await;
        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;

        match outcome {
            Ok(report) => {
                self.metrics.record_completed(
                    report.rows_updated,
                    report.standings_updated,
                    duration_ms,
                );
                tracing::info!(
                    "Episode {} recalculated: {} scores written, {} removed, {} standings rows in {:?}",
                    episode,
                    report.rows_updated,
                    report.rows_removed,
                    report.standings_updated,
                    duration
                );
                RunResult {
                    episode,
                    status: RunStatus::Completed,
                    phase: RunPhase::Done,
                    failed_during: None,
                    rows_updated: report.rows_updated,
                    rows_removed: report.rows_removed,
                    standings_updated: report.standings_updated,
                    config_issues: report.config_issues,
                    error: None,
                    started_at,
                    duration,
                }
            }
            Err(err) => {
                let (status, phase, failed_during) = match err {
                    RecalcError::Concurrency { .. } => {
                        self.metrics.record_rejected();
                        tracing::warn!("Episode {} recalculation rejected: {}", episode, err);
                        (RunStatus::Rejected, RunPhase::Idle, None)
                    }
                    _ => {
                        self.metrics.record_failed(duration_ms);
                        tracing::error!(
                            "Episode {} recalculation failed during {} ({}): {}",
                            episode,
                            tracker.phase,
                            err.kind(),
                            err
                        );
                        (RunStatus::Failed, RunPhase::Failed, Some(tracker.phase))
                    }
                };
                RunResult {
                    episode,
                    status,
                    phase,
                    failed_during,
                    rows_updated: 0,
                    rows_removed: 0,
                    standings_updated: 0,
                    config_issues: Vec::new(),
                    error: Some(err.to_string()),
                    started_at,
                    duration,
                }
            }
        }
    }

    /// Recalculate an episode, returning the typed error on failure
    pub async fn try_recalculate(
        &self,
        episode: EpisodeNumber,
        overrides: Option<&MultiplierOverride>,
    ) -> Result<RunReport> {
        let mut tracker = PhaseTracker::new(episode);
        self.run(episode, overrides, &mut tracker).await
    }

    async fn run(
        &self,
        episode: EpisodeNumber,
        overrides: Option<&MultiplierOverride>,
        tracker: &mut PhaseTracker,
    ) -> Result<RunReport> {
        let _lease =
            self.guard.try_acquire(episode).ok_or(RecalcError::Concurrency { episode })?;
        let store = self.store.as_ref();

        // Other engines and processes sharing the store hold the same lease
        let _store_lease = store
            .try_lock_episode(episode)
            .await
            .map_err(|source| RecalcError::Aggregation { episode, source })?
            .ok_or(RecalcError::Concurrency { episode })?;

        tracker.advance(RunPhase::ResolvingConfig);
        if let Some(overrides) = overrides {
            multiplier::validate_override(overrides)?;
        }
        let settings = store
            .read_settings()
            .await
            .map_err(|source| RecalcError::Aggregation { episode, source })?;
        let resolution = multiplier::resolve(&settings);
        let table = match overrides {
            Some(overrides) => resolution.table.with_override(overrides)?,
            None => resolution.table,
        };

        tracker.advance(RunPhase::Aggregating);
        // Roster edits after this point belong to the next run
        let roster = store
            .list_roster_entries(episode)
            .await
            .map_err(|source| RecalcError::Aggregation { episode, source })?;
        let raw = aggregator::aggregate(store, episode).await?;
        tracing::info!(
            "Episode {}: {} roster rows, {} scored contestants",
            episode,
            roster.len(),
            raw.len()
        );

        tracker.advance(RunPhase::Calculating);
        let candidates = self.calculator.calculate(&roster, &raw, &table);

        tracker.advance(RunPhase::Persisting);
        let outcome = store
            .upsert_episode_scores(episode, &candidates)
            .await
            .map_err(|source| RecalcError::Persistence { episode, source })?;

        tracker.advance(RunPhase::Rebuilding);
        let scope = self.rebuilder.scope_for(&candidates, &outcome);
        let standings_updated = self.rebuilder.rebuild(store, &scope).await?;

        tracker.advance(RunPhase::Done);
        Ok(RunReport {
            episode,
            roster_rows: roster.len(),
            rows_updated: outcome.written,
            rows_removed: outcome.removed,
            standings_updated,
            config_issues: resolution.issues,
        })
    }
}

impl fmt::Debug for RecalcEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecalcEngine")
            .field("config", &self.config)
            .field("in_flight", &self.guard.in_flight_count())
            .finish()
    }
}
