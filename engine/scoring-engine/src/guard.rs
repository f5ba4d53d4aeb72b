//! Per-episode run exclusion

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use league_store::EpisodeNumber;

/// Tracks which episodes have a recalculation in flight
#[derive(Debug, Clone, Default)]
pub struct EpisodeGuard {
    in_flight: Arc<DashMap<EpisodeNumber, DateTime<Utc>>>,
}

impl EpisodeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an episode. Returns `None` if a run already holds it.
    pub fn try_acquire(&self, episode: EpisodeNumber) -> Option<EpisodeLease> {
        match self.in_flight.entry(episode) {
            Entry::Occupied(held) => {
                tracing::warn!("Episode {} is held by a run started at {}", episode, held.get());
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Some(EpisodeLease { episode, in_flight: Arc::clone(&self.in_flight) })
            }
        }
    }

    pub fn is_in_flight(&self, episode: EpisodeNumber) -> bool {
        self.in_flight.contains_key(&episode)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// Held for the duration of a run; releases the episode on drop
#[derive(Debug)]
pub struct EpisodeLease {
    episode: EpisodeNumber,
    in_flight: Arc<DashMap<EpisodeNumber, DateTime<Utc>>>,
}

impl EpisodeLease {
    pub fn episode(&self) -> EpisodeNumber {
        self.episode
    }
}

impl Drop for EpisodeLease {
    fn drop(&mut self) {
        self.in_flight.remove(&self.episode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected_until_release() {
        let guard = EpisodeGuard::new();

        let lease = guard.try_acquire(3).unwrap();
        assert_eq!(lease.episode(), 3);
        assert!(guard.is_in_flight(3));
        assert!(guard.try_acquire(3).is_none());

        // Other episodes are independent
        let other = guard.try_acquire(4).unwrap();
        assert_eq!(guard.in_flight_count(), 2);

        drop(lease);
        assert!(!guard.is_in_flight(3));
        assert!(guard.try_acquire(3).is_some());
        drop(other);
    }

    #[test]
    fn test_clones_share_state() {
        let guard = EpisodeGuard::new();
        let clone = guard.clone();
        let _lease = guard.try_acquire(1).unwrap();
        assert!(clone.try_acquire(1).is_none());
    }
}
