//! League store trait and the in-memory implementation

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::types::{
    sort_standings, validate_picks, ContestantName, EpisodeNumber, EpisodeScore,
    EpisodeScoreCandidate, LeagueId, RawEventScore, RosterEntry, RosterPick, ScoreKey,
    StandingsEntry, StandingsPair, StandingsScope, UpsertOutcome, UserId,
};

/// Exclusive claim on an episode held by one recalculation run.
///
/// Whatever the store keeps to hold the claim is released when the lock
/// is dropped.
pub struct EpisodeLock {
    episode: EpisodeNumber,
    _held: Box<dyn Send>,
}

impl EpisodeLock {
    pub fn new(episode: EpisodeNumber, held: impl Send + 'static) -> Self {
        Self { episode, _held: Box::new(held) }
    }

    pub fn episode(&self) -> EpisodeNumber {
        self.episode
    }
}

impl fmt::Debug for EpisodeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpisodeLock").field("episode", &self.episode).finish()
    }
}

/// Data access used by the recalculation engine and the site around it
#[async_trait::async_trait]
pub trait LeagueStore: Send + Sync {
    /// Claim an episode for the length of a run. Returns `None` when any
    /// other holder, in this process or another, already has it.
    async fn try_lock_episode(&self, episode: EpisodeNumber) -> Result<Option<EpisodeLock>>;

    /// All roster rows for an episode, across every league and user
    async fn list_roster_entries(&self, episode: EpisodeNumber) -> Result<Vec<RosterEntry>>;

    /// Raw points per contestant for an episode, summed over every event
    async fn sum_raw_points(
        &self,
        episode: EpisodeNumber,
    ) -> Result<HashMap<ContestantName, Decimal>>;

    /// Flat key/value settings
    async fn read_settings(&self) -> Result<HashMap<String, String>>;

    /// Persist an episode's scores as one all-or-nothing batch
    async fn upsert_episode_scores(
        &self,
        episode: EpisodeNumber,
        candidates: &[EpisodeScoreCandidate],
    ) -> Result<UpsertOutcome>;

    /// Recompute standings for the scope and publish them atomically.
    /// Returns the number of standings rows written.
    async fn rebuild_standings(&self, scope: &StandingsScope) -> Result<usize>;

    /// Published standings, optionally for one league
    async fn read_standings(&self, league: Option<LeagueId>) -> Result<Vec<StandingsEntry>>;

    /// Stored episode scores for a user
    async fn read_episode_scores(
        &self,
        user: UserId,
        episode: EpisodeNumber,
        league: Option<LeagueId>,
    ) -> Result<Vec<EpisodeScore>>;

    /// The contestant who has earned a user the most points in a league
    async fn read_mvp(
        &self,
        user: UserId,
        league: LeagueId,
    ) -> Result<Option<(ContestantName, Decimal)>>;

    /// Replace a user's roster for one league and episode
    async fn replace_roster(
        &self,
        user: UserId,
        league: LeagueId,
        episode: EpisodeNumber,
        picks: &[RosterPick],
    ) -> Result<usize>;

    /// Record one raw scoring event
    async fn record_raw_score(
        &self,
        contestant: &ContestantName,
        episode: EpisodeNumber,
        points: Decimal,
    ) -> Result<()>;

    /// Write a setting value
    async fn write_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Make sure every candidate belongs to the episode being persisted
pub(crate) fn check_candidates(
    episode: EpisodeNumber,
    candidates: &[EpisodeScoreCandidate],
) -> Result<()> {
    if let Some(stray) = candidates.iter().find(|c| c.episode != episode) {
        return Err(StoreError::invalid_operation(format!(
            "candidate for episode {} in batch for episode {}",
            stray.episode, episode
        )));
    }
    Ok(())
}

/// Pick the highest total, breaking ties on the contestant key
pub(crate) fn best_contestant(
    totals: impl IntoIterator<Item = (ContestantName, Decimal)>,
) -> Option<(ContestantName, Decimal)> {
    totals.into_iter().fold(None, |best, (name, total)| match best {
        Some((best_name, best_total))
            if best_total > total || (best_total == total && best_name <= name) =>
        {
            Some((best_name, best_total))
        }
        _ => Some((name, total)),
    })
}

type StandingsSnapshot = BTreeMap<StandingsPair, Decimal>;

#[derive(Debug, Default)]
struct Tables {
    rosters: BTreeMap<(UserId, LeagueId, EpisodeNumber), Vec<RosterPick>>,
    raw_scores: Vec<RawEventScore>,
    settings: HashMap<String, String>,
    episode_scores: BTreeMap<ScoreKey, EpisodeScore>,
}

impl Tables {
    fn totals_for(&self, pair: StandingsPair) -> Option<Decimal> {
        let mut rows = self
            .episode_scores
            .values()
            .filter(|score| score.pair() == pair)
            .peekable();
        rows.peek()?;
        Some(rows.map(|score| score.calculated_points).sum())
    }

    fn has_rows(&self, pair: StandingsPair) -> bool {
        self.episode_scores.values().any(|score| score.pair() == pair)
    }

    fn all_totals(&self) -> StandingsSnapshot {
        let mut totals = StandingsSnapshot::new();
        for score in self.episode_scores.values() {
            *totals.entry(score.pair()).or_insert(Decimal::ZERO) += score.calculated_points;
        }
        totals
    }
}

/// In-memory league store.
///
/// Table writes happen under one write lock, so readers see either the old or
/// the new rows. The standings cache is an immutable snapshot behind an `Arc`
/// that rebuilds replace whole.
#[derive(Debug, Default)]
pub struct InMemoryLeagueStore {
    tables: RwLock<Tables>,
    standings: RwLock<Arc<StandingsSnapshot>>,
    rebuild_lock: Mutex<()>,
    held_episodes: Arc<Mutex<HashSet<EpisodeNumber>>>,
}

/// Releases an in-memory episode claim on drop
struct HeldEpisode {
    episode: EpisodeNumber,
    held: Arc<Mutex<HashSet<EpisodeNumber>>>,
}

impl Drop for HeldEpisode {
    fn drop(&mut self) {
        self.held.lock().remove(&self.episode);
    }
}

impl InMemoryLeagueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored episode score rows, across all episodes
    pub fn episode_score_count(&self) -> usize {
        self.tables.read().episode_scores.len()
    }

    fn publish(&self, snapshot: StandingsSnapshot) {
        *self.standings.write() = Arc::new(snapshot);
    }
}

#[async_trait::async_trait]
impl LeagueStore for InMemoryLeagueStore {
    async fn try_lock_episode(&self, episode: EpisodeNumber) -> Result<Option<EpisodeLock>> {
        if !self.held_episodes.lock().insert(episode) {
            return Ok(None);
        }
        let held = HeldEpisode { episode, held: Arc::clone(&self.held_episodes) };
        Ok(Some(EpisodeLock::new(episode, held)))
    }

    async fn list_roster_entries(&self, episode: EpisodeNumber) -> Result<Vec<RosterEntry>> {
        let tables = self.tables.read();
        let entries = tables
            .rosters
            .iter()
            .filter(|((_, _, ep), _)| *ep == episode)
            .flat_map(|(&(user_id, league_id, episode), picks)| {
                picks.iter().map(move |pick| RosterEntry {
                    user_id,
                    league_id,
                    episode,
                    contestant: pick.contestant.clone(),
                    rank: pick.rank,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn sum_raw_points(
        &self,
        episode: EpisodeNumber,
    ) -> Result<HashMap<ContestantName, Decimal>> {
        let tables = self.tables.read();
        let mut totals = HashMap::new();
        for event in tables.raw_scores.iter().filter(|e| e.episode == episode) {
            *totals.entry(event.contestant.clone()).or_insert(Decimal::ZERO) += event.points;
        }
        Ok(totals)
    }

    async fn read_settings(&self) -> Result<HashMap<String, String>> {
        Ok(self.tables.read().settings.clone())
    }

    async fn upsert_episode_scores(
        &self,
        episode: EpisodeNumber,
        candidates: &[EpisodeScoreCandidate],
    ) -> Result<UpsertOutcome> {
        check_candidates(episode, candidates)?;

        let incoming: BTreeMap<ScoreKey, &EpisodeScoreCandidate> =
            candidates.iter().map(|c| (c.key(), c)).collect();

        let mut tables = self.tables.write();
        let stale: Vec<ScoreKey> = tables
            .episode_scores
            .keys()
            .filter(|key| key.episode == episode && !incoming.contains_key(*key))
            .cloned()
            .collect();

        let mut outcome = UpsertOutcome::default();
        for key in stale {
            outcome.removed_pairs.insert((key.user_id, key.league_id));
            tables.episode_scores.remove(&key);
            outcome.removed += 1;
        }

        for (key, candidate) in incoming {
            tables.episode_scores.insert(key, candidate.clone());
            outcome.written += 1;
        }

        tracing::debug!(
            "Stored {} episode scores for episode {} ({} stale removed)",
            outcome.written,
            episode,
            outcome.removed
        );

        Ok(outcome)
    }

    async fn rebuild_standings(&self, scope: &StandingsScope) -> Result<usize> {
        let _rebuild = self.rebuild_lock.lock();

        let (snapshot, written) = match scope {
            StandingsScope::All => {
                let fresh = self.tables.read().all_totals();
                let written = fresh.len();
                (fresh, written)
            }
            StandingsScope::Pairs(pairs) => {
                let tables = self.tables.read();
                let recomputed: Vec<(StandingsPair, Option<Decimal>)> =
                    pairs.iter().map(|&pair| (pair, tables.totals_for(pair))).collect();

                let mut next = StandingsSnapshot::clone(&self.standings.read());
                // Pairs left without scores by an earlier failed rebuild
                next.retain(|&pair, _| tables.has_rows(pair));
                drop(tables);

                let mut written = 0;
                for (pair, total) in recomputed {
                    match total {
                        Some(total) => {
                            next.insert(pair, total);
                            written += 1;
                        }
                        None => {
                            next.remove(&pair);
                        }
                    }
                }
                (next, written)
            }
        };

        self.publish(snapshot);
        Ok(written)
    }

    async fn read_standings(&self, league: Option<LeagueId>) -> Result<Vec<StandingsEntry>> {
        let snapshot = Arc::clone(&self.standings.read());
        let mut entries: Vec<StandingsEntry> = snapshot
            .iter()
            .filter(|((_, league_id), _)| league.map_or(true, |l| l == *league_id))
            .map(|(&(user_id, league_id), &total_score)| StandingsEntry {
                user_id,
                league_id,
                total_score,
            })
            .collect();
        sort_standings(&mut entries);
        Ok(entries)
    }

    async fn read_episode_scores(
        &self,
        user: UserId,
        episode: EpisodeNumber,
        league: Option<LeagueId>,
    ) -> Result<Vec<EpisodeScore>> {
        let tables = self.tables.read();
        let mut scores: Vec<EpisodeScore> = tables
            .episode_scores
            .values()
            .filter(|s| s.user_id == user && s.episode == episode)
            .filter(|s| league.map_or(true, |l| l == s.league_id))
            .cloned()
            .collect();
        scores.sort_by(|a, b| a.league_id.cmp(&b.league_id).then(a.rank.cmp(&b.rank)));
        Ok(scores)
    }

    async fn read_mvp(
        &self,
        user: UserId,
        league: LeagueId,
    ) -> Result<Option<(ContestantName, Decimal)>> {
        let tables = self.tables.read();
        let mut totals: BTreeMap<ContestantName, Decimal> = BTreeMap::new();
        for score in tables.episode_scores.values().filter(|s| s.pair() == (user, league)) {
            *totals.entry(score.contestant.clone()).or_insert(Decimal::ZERO) +=
                score.calculated_points;
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

        let mut sorted = picks.to_vec();
        sorted.sort_by_key(|pick| pick.rank);

        let mut tables = self.tables.write();
        if sorted.is_empty() {
            tables.rosters.remove(&(user, league, episode));
        } else {
            tables.rosters.insert((user, league, episode), sorted);
        }
        Ok(picks.len())
    }

    async fn record_raw_score(
        &self,
        contestant: &ContestantName,
        episode: EpisodeNumber,
        points: Decimal,
    ) -> Result<()> {
        self.tables.write().raw_scores.push(RawEventScore {
            contestant: contestant.clone(),
            episode,
            points,
        });
        Ok(())
    }

    async fn write_setting(&self, key: &str, value: &str) -> Result<()> {
        self.tables.write().settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Pairs touched by a set of candidates
pub fn touched_pairs(candidates: &[EpisodeScoreCandidate]) -> BTreeSet<StandingsPair> {
    candidates.iter().map(EpisodeScore::pair).collect()
}
