//! Weighted score calculation

use rayon::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

use league_store::{EpisodeScoreCandidate, RosterEntry};

use crate::aggregator::RawPoints;
use crate::multiplier::MultiplierTable;

/// Turns roster rows into weighted episode scores.
///
/// Pure over its inputs. Large roster sets are scored on the rayon pool;
/// the output is sorted by score identity either way.
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    parallel_threshold: usize,
    points_scale: u32,
}

impl ScoreCalculator {
    pub fn new(parallel_threshold: usize, points_scale: u32) -> Self {
        Self { parallel_threshold, points_scale }
    }

    /// Weighted points for one roster row
    pub fn weigh(&self, raw: Decimal, multiplier: Decimal) -> Decimal {
        (raw * multiplier)
            .round_dp_with_strategy(self.points_scale, RoundingStrategy::MidpointAwayFromZero)
    }

    fn score_entry(
        &self,
        entry: &RosterEntry,
        raw: &RawPoints,
        table: &MultiplierTable,
    ) -> EpisodeScoreCandidate {
        EpisodeScoreCandidate {
            user_id: entry.user_id,
            league_id: entry.league_id,
            contestant: entry.contestant.clone(),
            episode: entry.episode,
            rank: entry.rank,
            calculated_points: self.weigh(raw.get(&entry.contestant), table.get(entry.rank)),
        }
    }

    /// One candidate per roster row
    pub fn calculate(
        &self,
        entries: &[RosterEntry],
        raw: &RawPoints,
        table: &MultiplierTable,
    ) -> Vec<EpisodeScoreCandidate> {
        let mut candidates: Vec<EpisodeScoreCandidate> = if entries.len() >= self.parallel_threshold
        {
            entries.par_iter().map(|entry| self.score_entry(entry, raw, table)).collect()
        } else {
            entries.iter().map(|entry| self.score_entry(entry, raw, table)).collect()
        };

        candidates.sort_by_cached_key(EpisodeScoreCandidate::key);
        candidates
    }
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new(crate::DEFAULT_PARALLEL_THRESHOLD, crate::DEFAULT_POINTS_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiplier::MultiplierOverride;
    use league_store::ContestantName;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn name(raw: &str) -> ContestantName {
        ContestantName::parse(raw).unwrap()
    }

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    fn entry(user: i64, league: i64, queen: &str, rank: i16) -> RosterEntry {
        RosterEntry { user_id: user, league_id: league, episode: 2, contestant: name(queen), rank }
    }

    fn raw_points() -> RawPoints {
        vec![(name("Raja"), dec("3")), (name("Raja"), dec("4"))].into_iter().collect()
    }

    #[test]
    fn test_multiplier_applied_to_raw_points() {
        let table = MultiplierTable::default()
            .with_override(&MultiplierOverride::from([(1, dec("2.5"))]))
            .unwrap();
        let entries = vec![entry(1, 10, "Raja", 1), entry(2, 10, "Raja", 5)];

        let scores = ScoreCalculator::default().calculate(&entries, &raw_points(), &table);
        assert_eq!(scores[0].calculated_points, dec("17.5"));
        assert_eq!(scores[1].calculated_points, dec("7"));
        assert_eq!(scores[1].rank, 5);
    }

    #[test]
    fn test_unknown_contestant_scores_zero() {
        let scores = ScoreCalculator::default().calculate(
            &[entry(1, 10, "Manila", 1)],
            &raw_points(),
            &MultiplierTable::default(),
        );
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].calculated_points, Decimal::ZERO);
        assert_eq!(scores[0].contestant, name("Manila"));
    }

    #[test]
    fn test_rounding_happens_once() {
        let calculator = ScoreCalculator::new(16, 2);
        assert_eq!(calculator.weigh(dec("3.333"), dec("1.25")), dec("4.17"));
        assert_eq!(calculator.weigh(dec("0.005"), Decimal::ONE), dec("0.01"));
    }

    #[test]
    fn test_same_contestant_in_two_leagues_keeps_both_rows() {
        let entries = vec![entry(1, 10, "Raja", 1), entry(2, 20, "Raja", 1)];
        let scores =
            ScoreCalculator::default().calculate(&entries, &raw_points(), &MultiplierTable::default());
        assert_eq!(scores.len(), 2);
        assert_ne!(scores[0].key(), scores[1].key());
    }

    proptest! {
        #[test]
        fn prop_parallel_matches_sequential(
            rows in proptest::collection::vec((1i64..20, 1i64..4, 0usize..6, 1i16..7), 0..200)
        ) {
            let queens = ["Raja", "Manila", "Jujubee", "Yara", "Carmen", "Delta"];
            let mut seen = std::collections::HashSet::new();
            let entries: Vec<RosterEntry> = rows
                .into_iter()
                .filter(|(user, league, queen, _)| seen.insert((*user, *league, *queen)))
                .map(|(user, league, queen, rank)| entry(user, league, queens[queen], rank))
                .collect();

            let raw: RawPoints = queens
                .iter()
                .enumerate()
                .map(|(i, q)| (name(q), Decimal::new(i as i64 * 37 + 5, 1)))
                .collect();
            let table = MultiplierTable::default();

            let sequential = ScoreCalculator::new(usize::MAX, 2).calculate(&entries, &raw, &table);
            let parallel = ScoreCalculator::new(1, 2).calculate(&entries, &raw, &table);
            prop_assert_eq!(&sequential, &parallel);
            prop_assert_eq!(sequential.len(), entries.len());
        }
    }
}
