//! Postgres-backed league store

use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, Row};
use std::collections::{BTreeSet, HashMap};

use crate::backend::{best_contestant, check_candidates, EpisodeLock, LeagueStore};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::types::{
    validate_picks, ContestantName, EpisodeNumber, EpisodeScore, EpisodeScoreCandidate, LeagueId,
    RosterEntry, RosterPick, StandingsEntry, StandingsScope, UpsertOutcome, UserId,
};

/// Advisory lock namespace for per-episode score writes
const EPISODE_LOCK_NAMESPACE: i32 = 0x5153_0001;

/// Advisory lock namespace for standings rebuilds
const STANDINGS_LOCK_NAMESPACE: i32 = 0x5153_0002;

/// Advisory lock namespace for run-long episode leases
const RUN_LOCK_NAMESPACE: i32 = 0x5153_0003;

/// Session advisory lock held on a connection outside the pool.
///
/// Closing the connection ends the session, which releases the lock.
struct SessionLock {
    episode: EpisodeNumber,
    conn: Option<PgConnection>,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let episode = self.episode;
        // Without a runtime the socket is dropped, which also ends the session
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.close().await {
                    tracing::warn!("Closing lease connection for episode {} failed: {}", episode, e);
                }
            });
        }
    }
}

/// League store over a Postgres connection pool.
///
/// Each write path runs in a single transaction. Score writes for an episode
/// and standings rebuilds also take transaction-scoped advisory locks, so
/// separate processes recalculating at once serialize at the database.
#[derive(Debug, Clone)]
pub struct PgLeagueStore {
    pool: PgPool,
}

impl PgLeagueStore {
    /// Connect using the given configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(crate::StoreError::config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.database_url)
            .await?;

        let store = Self { pool };
        if config.run_migrations {
            store.migrate().await?;
        }

        tracing::info!("Connected league store (max {} connections)", config.max_connections);
        Ok(store)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("League store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn contestant_from_row(row: &PgRow) -> Result<ContestantName> {
    let raw: String = row.try_get("queen")?;
    ContestantName::parse(&raw)
}

fn episode_score_from_row(row: &PgRow) -> Result<EpisodeScore> {
    Ok(EpisodeScore {
        user_id: row.try_get("user_id")?,
        league_id: row.try_get("league_id")?,
        contestant: contestant_from_row(row)?,
        episode: row.try_get("episode")?,
        rank: row.try_get("rank")?,
        calculated_points: row.try_get("calculated_points")?,
    })
}

#[async_trait::async_trait]
impl LeagueStore for PgLeagueStore {
    async fn try_lock_episode(&self, episode: EpisodeNumber) -> Result<Option<EpisodeLock>> {
        let mut conn = self.pool.acquire().await?.detach();

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
            .bind(RUN_LOCK_NAMESPACE)
            .bind(episode)
            .fetch_one(&mut conn)
            .await?;

        if !acquired {
            conn.close().await?;
            return Ok(None);
        }

        tracing::debug!("Holding run lease for episode {}", episode);
        Ok(Some(EpisodeLock::new(episode, SessionLock { episode, conn: Some(conn) })))
    }

    async fn list_roster_entries(&self, episode: EpisodeNumber) -> Result<Vec<RosterEntry>> {
        let rows = sqlx::query(
            "SELECT user_id, league_id, episode, queen, rank FROM roster_entries \
             WHERE episode = $1 ORDER BY user_id, league_id, rank",
        )
        .bind(episode)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RosterEntry {
                    user_id: row.try_get("user_id")?,
                    league_id: row.try_get("league_id")?,
                    episode: row.try_get("episode")?,
                    contestant: contestant_from_row(row)?,
                    rank: row.try_get("rank")?,
                })
            })
            .collect()
    }

    async fn sum_raw_points(
        &self,
        episode: EpisodeNumber,
    ) -> Result<HashMap<ContestantName, Decimal>> {
        let rows = sqlx::query(
            "SELECT MIN(queen) AS queen, SUM(points) AS total FROM queen_box_scores \
             WHERE episode = $1 GROUP BY queen_key",
        )
        .bind(episode)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = HashMap::with_capacity(rows.len());
        for row in &rows {
            let total: Decimal = row.try_get("total")?;
            totals.insert(contestant_from_row(row)?, total);
        }
        Ok(totals)
    }

    async fn read_settings(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT key, value FROM settings").fetch_all(&self.pool).await?;

        let mut settings = HashMap::with_capacity(rows.len());
        for row in &rows {
            settings.insert(row.try_get("key")?, row.try_get("value")?);
        }
        Ok(settings)
    }

    async fn upsert_episode_scores(
        &self,
        episode: EpisodeNumber,
        candidates: &[EpisodeScoreCandidate],
    ) -> Result<UpsertOutcome> {
        check_candidates(episode, candidates)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(EPISODE_LOCK_NAMESPACE)
            .bind(episode)
            .execute(&mut *tx)
            .await?;

        let incoming: BTreeSet<(UserId, LeagueId, &str)> = candidates
            .iter()
            .map(|c| (c.user_id, c.league_id, c.contestant.key()))
            .collect();

        let existing = sqlx::query(
            "SELECT user_id, league_id, queen_key FROM user_queen_scores WHERE episode = $1",
        )
        .bind(episode)
        .fetch_all(&mut *tx)
        .await?;

        let mut outcome = UpsertOutcome::default();
        for row in &existing {
            let user_id: UserId = row.try_get("user_id")?;
            let league_id: LeagueId = row.try_get("league_id")?;
            let queen_key: String = row.try_get("queen_key")?;
            if incoming.contains(&(user_id, league_id, queen_key.as_str())) {
                continue;
            }

            sqlx::query(
                "DELETE FROM user_queen_scores \
                 WHERE user_id = $1 AND league_id = $2 AND queen_key = $3 AND episode = $4",
            )
            .bind(user_id)
            .bind(league_id)
            .bind(&queen_key)
            .bind(episode)
            .execute(&mut *tx)
            .await?;

            outcome.removed += 1;
            outcome.removed_pairs.insert((user_id, league_id));
        }

        for candidate in candidates {
            sqlx::query(
                "INSERT INTO user_queen_scores \
                     (user_id, league_id, queen, queen_key, episode, rank, calculated_points, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
                 ON CONFLICT (user_id, league_id, queen_key, episode) DO UPDATE SET \
                     queen = EXCLUDED.queen, \
                     rank = EXCLUDED.rank, \
                     calculated_points = EXCLUDED.calculated_points, \
                     updated_at = EXCLUDED.updated_at",
            )
            .bind(candidate.user_id)
            .bind(candidate.league_id)
            .bind(candidate.contestant.as_str())
            .bind(candidate.contestant.key())
            .bind(episode)
            .bind(candidate.rank)
            .bind(candidate.calculated_points)
            .execute(&mut *tx)
            .await?;

            outcome.written += 1;
        }

        tx.commit().await?;

        tracing::debug!(
            "Committed {} episode scores for episode {} ({} stale removed)",
            outcome.written,
            episode,
            outcome.removed
        );

        Ok(outcome)
    }

    async fn rebuild_standings(&self, scope: &StandingsScope) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1, 0)")
            .bind(STANDINGS_LOCK_NAMESPACE)
            .execute(&mut *tx)
            .await?;

        let written = match scope {
            StandingsScope::All => {
                // Readers keep seeing the previous rows until commit
                sqlx::query("DELETE FROM league_standings").execute(&mut *tx).await?;
                sqlx::query(
                    "INSERT INTO league_standings (user_id, league_id, total_score, updated_at) \
                     SELECT user_id, league_id, SUM(calculated_points), NOW() \
                     FROM user_queen_scores GROUP BY user_id, league_id",
                )
                .execute(&mut *tx)
                .await?
                .rows_affected() as usize
            }
            StandingsScope::Pairs(pairs) => {
                let mut written = 0;
                for &(user_id, league_id) in pairs {
                    let upserted = sqlx::query(
                        "INSERT INTO league_standings (user_id, league_id, total_score, updated_at) \
                         SELECT user_id, league_id, SUM(calculated_points), NOW() \
                         FROM user_queen_scores WHERE user_id = $1 AND league_id = $2 \
                         GROUP BY user_id, league_id \
                         ON CONFLICT (user_id, league_id) DO UPDATE SET \
                             total_score = EXCLUDED.total_score, \
                             updated_at = EXCLUDED.updated_at",
                    )
                    .bind(user_id)
                    .bind(league_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

                    if upserted == 0 {
                        sqlx::query(
                            "DELETE FROM league_standings WHERE user_id = $1 AND league_id = $2",
                        )
                        .bind(user_id)
                        .bind(league_id)
                        .execute(&mut *tx)
                        .await?;
                    } else {
                        written += 1;
                    }
                }

                // Pairs left without scores by an earlier failed rebuild
                sqlx::query(
                    "DELETE FROM league_standings s WHERE NOT EXISTS (\
                         SELECT 1 FROM user_queen_scores q \
                         WHERE q.user_id = s.user_id AND q.league_id = s.league_id)",
                )
                .execute(&mut *tx)
                .await?;

                written
            }
        };

        tx.commit().await?;
        Ok(written)
    }

    async fn read_standings(&self, league: Option<LeagueId>) -> Result<Vec<StandingsEntry>> {
        let rows = sqlx::query(
            "SELECT user_id, league_id, total_score FROM league_standings \
             WHERE $1::BIGINT IS NULL OR league_id = $1 \
             ORDER BY total_score DESC, user_id, league_id",
        )
        .bind(league)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StandingsEntry {
                    user_id: row.try_get("user_id")?,
                    league_id: row.try_get("league_id")?,
                    total_score: row.try_get("total_score")?,
                })
            })
            .collect()
    }

    async fn read_episode_scores(
        &self,
        user: UserId,
        episode: EpisodeNumber,
        league: Option<LeagueId>,
    ) -> Result<Vec<EpisodeScore>> {
        let rows = sqlx::query(
            "SELECT user_id, league_id, queen, episode, rank, calculated_points \
             FROM user_queen_scores \
             WHERE user_id = $1 AND episode = $2 AND ($3::BIGINT IS NULL OR league_id = $3) \
             ORDER BY league_id, rank",
        )
        .bind(user)
        .bind(episode)
        .bind(league)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(episode_score_from_row).collect()
    }

    async fn read_mvp(
        &self,
        user: UserId,
        league: LeagueId,
    ) -> Result<Option<(ContestantName, Decimal)>> {
        let rows = sqlx::query(
            "SELECT MIN(queen) AS queen, SUM(calculated_points) AS total \
             FROM user_queen_scores WHERE user_id = $1 AND league_id = $2 \
             GROUP BY queen_key",
        )
        .bind(user)
        .bind(league)
        .fetch_all(&self.pool)
        .await?;

        let mut totals = Vec::with_capacity(rows.len());
        for row in &rows {
            let total: Decimal = row.try_get("total")?;
            totals.push((contestant_from_row(row)?, total));
        }
        Ok(best_contestant(totals))
    }

    async fn replace_roster(
        &self,
        user: UserId,
        league: LeagueId,
        episode: EpisodeNumber,
        picks: &[RosterPick],
    ) -> Result<usize> {
        validate_picks(picks)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM roster_entries WHERE user_id = $1 AND league_id = $2 AND episode = $3",
        )
        .bind(user)
        .bind(league)
        .bind(episode)
        .execute(&mut *tx)
        .await?;

        for pick in picks {
            sqlx::query(
                "INSERT INTO roster_entries (user_id, league_id, episode, queen, queen_key, rank) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(user)
            .bind(league)
            .bind(episode)
            .bind(pick.contestant.as_str())
            .bind(pick.contestant.key())
            .bind(pick.rank)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(picks.len())
    }

    async fn record_raw_score(
        &self,
        contestant: &ContestantName,
        episode: EpisodeNumber,
        points: Decimal,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO queen_box_scores (queen, queen_key, episode, points) VALUES ($1, $2, $3, $4)",
        )
        .bind(contestant.as_str())
        .bind(contestant.key())
        .bind(episode)
        .bind(points)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
