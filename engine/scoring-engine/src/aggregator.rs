//! Raw score aggregation

use rust_decimal::Decimal;
use std::collections::HashMap;

use league_store::{ContestantName, EpisodeNumber, LeagueStore};

use crate::error::{RecalcError, Result};

/// Raw points per contestant for one episode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPoints {
    totals: HashMap<ContestantName, Decimal>,
}

impl RawPoints {
    pub fn new(totals: HashMap<ContestantName, Decimal>) -> Self {
        Self { totals }
    }

    /// Points for a contestant; contestants without events have 0
    pub fn get(&self, contestant: &ContestantName) -> Decimal {
        self.totals.get(contestant).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

impl FromIterator<(ContestantName, Decimal)> for RawPoints {
    fn from_iter<I: IntoIterator<Item = (ContestantName, Decimal)>>(iter: I) -> Self {
        let mut totals = HashMap::new();
        for (contestant, points) in iter {
            *totals.entry(contestant).or_insert(Decimal::ZERO) += points;
        }
        Self { totals }
    }
}

/// Read the summed raw points for an episode
pub async fn aggregate(store: &dyn LeagueStore, episode: EpisodeNumber) -> Result<RawPoints> {
    let totals = store
        .sum_raw_points(episode)
        .await
        .map_err(|source| RecalcError::Aggregation { episode, source })?;

    tracing::debug!("Aggregated raw points for {} contestants in episode {}", totals.len(), episode);
    Ok(RawPoints::new(totals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_store::InMemoryLeagueStore;
    use std::str::FromStr;

    fn name(raw: &str) -> ContestantName {
        ContestantName::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_sums_events() {
        let store = InMemoryLeagueStore::new();
        store.record_raw_score(&name("Trixie"), 2, Decimal::from(3)).await.unwrap();
        store.record_raw_score(&name("Trixie"), 2, Decimal::from(4)).await.unwrap();
        store.record_raw_score(&name("Katya"), 1, Decimal::from(9)).await.unwrap();

        let raw = aggregate(&store, 2).await.unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.get(&name("Trixie")), Decimal::from(7));
        assert_eq!(raw.get(&name("Katya")), Decimal::ZERO);
    }

    #[test]
    fn test_from_iter_sums_duplicates() {
        let raw: RawPoints = vec![
            (name("Trixie"), Decimal::from_str("1.25").unwrap()),
            (name("trixie"), Decimal::from_str("0.75").unwrap()),
        ]
        .into_iter()
        .collect();
        assert_eq!(raw.get(&name("Trixie")), Decimal::from(2));
    }
}
