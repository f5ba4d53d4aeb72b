//! Type definitions for league data

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Result, StoreError};

pub type UserId = i64;
pub type LeagueId = i64;
pub type EpisodeNumber = i32;

/// Roster slot; 1 is the highest priority
pub type Rank = i16;

/// A (user, league) pair, the unit of a standings row
pub type StandingsPair = (UserId, LeagueId);

/// Contestant ("queen") name used as a business key.
///
/// The display spelling has surrounding whitespace trimmed and internal runs
/// collapsed. Equality, hashing and ordering use the case-folded key, so
/// spelling variants of the same name resolve to one contestant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContestantName {
    display: String,
    key: String,
}

impl ContestantName {
    /// Validate and normalize a raw contestant name
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.chars().any(char::is_control) {
            return Err(StoreError::invalid_contestant(format!(
                "{raw:?} contains control characters"
            )));
        }

        let display = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if display.is_empty() {
            return Err(StoreError::invalid_contestant("name is empty"));
        }

        let key = display.to_lowercase();
        Ok(Self { display, key })
    }

    /// Normalized display spelling
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Case-folded identity key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for ContestantName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ContestantName {}

impl Hash for ContestantName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ContestantName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContestantName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for ContestantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl FromStr for ContestantName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContestantName {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContestantName> for String {
    fn from(name: ContestantName) -> Self {
        name.display
    }
}

/// One pick in a roster submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPick {
    pub contestant: ContestantName,
    pub rank: Rank,
}

/// A stored roster row for one user, league and episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub episode: EpisodeNumber,
    pub contestant: ContestantName,
    pub rank: Rank,
}

/// Raw (unweighted) points a contestant earned from one scoring event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEventScore {
    pub contestant: ContestantName,
    pub episode: EpisodeNumber,
    pub points: Decimal,
}

/// Identity of an episode score row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScoreKey {
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub contestant: ContestantName,
    pub episode: EpisodeNumber,
}

/// Weighted score for one roster pick in one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeScore {
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub contestant: ContestantName,
    pub episode: EpisodeNumber,
    pub rank: Rank,
    pub calculated_points: Decimal,
}

/// A freshly calculated score that has not been persisted yet
pub type EpisodeScoreCandidate = EpisodeScore;

impl EpisodeScore {
    pub fn key(&self) -> ScoreKey {
        ScoreKey {
            user_id: self.user_id,
            league_id: self.league_id,
            contestant: self.contestant.clone(),
            episode: self.episode,
        }
    }

    pub fn pair(&self) -> StandingsPair {
        (self.user_id, self.league_id)
    }
}

/// Season-to-date total for one user in one league
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsEntry {
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub total_score: Decimal,
}

/// Which standings rows a rebuild recomputes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandingsScope {
    /// Recompute every pair and replace the whole cache
    All,
    /// Recompute only the listed pairs
    Pairs(BTreeSet<StandingsPair>),
}

/// Result of persisting one episode's scores
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Rows inserted or overwritten
    pub written: usize,
    /// Stale rows removed because their pick no longer exists
    pub removed: usize,
    /// Pairs that lost at least one row
    pub removed_pairs: BTreeSet<StandingsPair>,
}

/// Check a roster submission: ranks positive and distinct, each contestant once
pub fn validate_picks(picks: &[RosterPick]) -> Result<()> {
    let mut ranks = HashSet::new();
    let mut contestants = HashSet::new();

    for pick in picks {
        if pick.rank < 1 {
            return Err(StoreError::invalid_roster(format!(
                "rank {} for {} must be at least 1",
                pick.rank, pick.contestant
            )));
        }
        if !ranks.insert(pick.rank) {
            return Err(StoreError::invalid_roster(format!("rank {} used twice", pick.rank)));
        }
        if !contestants.insert(&pick.contestant) {
            return Err(StoreError::invalid_roster(format!(
                "{} picked more than once",
                pick.contestant
            )));
        }
    }

    Ok(())
}

/// Standings order: highest total first, then user and league id
pub fn sort_standings(entries: &mut [StandingsEntry]) {
    entries.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.user_id.cmp(&b.user_id))
            .then(a.league_id.cmp(&b.league_id))
    });
}
