//! Standings rebuild

use tokio::sync::Mutex;

use league_store::{touched_pairs, EpisodeScoreCandidate, LeagueStore, StandingsScope, UpsertOutcome};

use crate::config::RebuildStrategy;
use crate::error::{RecalcError, Result};

/// Republishes season totals after an episode's scores change.
///
/// Rebuilds are serialized process-wide for both strategies; the store makes
/// each one atomic towards readers.
#[derive(Debug)]
pub struct StandingsRebuilder {
    strategy: RebuildStrategy,
    serial: Mutex<()>,
}

impl StandingsRebuilder {
    pub fn new(strategy: RebuildStrategy) -> Self {
        Self { strategy, serial: Mutex::new(()) }
    }

    pub fn strategy(&self) -> RebuildStrategy {
        self.strategy
    }

    /// Pairs whose totals this episode's write could have changed
    pub fn scope_for(
        &self,
        candidates: &[EpisodeScoreCandidate],
        outcome: &UpsertOutcome,
    ) -> StandingsScope {
        match self.strategy {
            RebuildStrategy::Full => StandingsScope::All,
            RebuildStrategy::Incremental => {
                let mut pairs = touched_pairs(candidates);
                pairs.extend(outcome.removed_pairs.iter().copied());
                StandingsScope::Pairs(pairs)
            }
        }
    }

    /// Rebuild and publish the scope; returns standings rows written
    ///
    /// An empty scope still reaches the store, which drops standings rows
    /// for pairs that no longer have any scores.
    pub async fn rebuild(&self, store: &dyn LeagueStore, scope: &StandingsScope) -> Result<usize> {
        let _serial = self.serial.lock().await;
        let written = store
            .rebuild_standings(scope)
            .await
            .map_err(|source| RecalcError::Rebuild { source })?;

        tracing::debug!("Rebuilt {} standings rows ({} strategy)", written, self.strategy);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_store::{ContestantName, Decimal, EpisodeScore, InMemoryLeagueStore};

    fn score(user: i64, league: i64, queen: &str, episode: i32, points: i64) -> EpisodeScore {
        EpisodeScore {
            user_id: user,
            league_id: league,
            contestant: ContestantName::parse(queen).unwrap(),
            episode,
            rank: 1,
            calculated_points: Decimal::from(points),
        }
    }

    #[test]
    fn test_scope_for_strategies() {
        let candidates = vec![score(1, 10, "Alaska", 1, 5), score(2, 10, "Alaska", 1, 5)];
        let outcome = UpsertOutcome {
            removed_pairs: [(3, 10)].into_iter().collect(),
            ..Default::default()
        };

        let full = StandingsRebuilder::new(RebuildStrategy::Full);
        assert_eq!(full.scope_for(&candidates, &outcome), StandingsScope::All);

        let incremental = StandingsRebuilder::new(RebuildStrategy::Incremental);
        match incremental.scope_for(&candidates, &outcome) {
            StandingsScope::Pairs(pairs) => {
                assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec![(1, 10), (2, 10), (3, 10)]);
            }
            StandingsScope::All => panic!("Expected pair scope"),
        }
    }

    #[tokio::test]
    async fn test_empty_scope_still_clears_orphans() {
        let store = InMemoryLeagueStore::new();
        store
            .upsert_episode_scores(1, &[score(1, 10, "Alaska", 1, 5), score(2, 10, "Detox", 1, 3)])
            .await
            .unwrap();
        let rebuilder = StandingsRebuilder::new(RebuildStrategy::Incremental);
        assert_eq!(rebuilder.rebuild(&store, &StandingsScope::All).await.unwrap(), 2);

        // User 2's scores go away but their standings row is never rebuilt
        store.upsert_episode_scores(1, &[score(1, 10, "Alaska", 1, 5)]).await.unwrap();

        let written = rebuilder.rebuild(&store, &StandingsScope::Pairs(Default::default())).await.unwrap();
        assert_eq!(written, 0);
        let standings = store.read_standings(None).await.unwrap();
        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].user_id, 1);
    }
}
