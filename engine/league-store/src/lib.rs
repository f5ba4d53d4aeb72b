//! # League Store
//!
//! Storage for the Drag League scoring pipeline: rosters, raw box scores,
//! settings, derived per-episode scores and the published standings cache.
//!
//! ## Architecture
//!
//! - **LeagueStore**: Collaborator trait the recalculation engine reads and writes through
//! - **InMemoryLeagueStore**: Copy-on-write in-memory implementation
//! - **PgLeagueStore**: Transactional Postgres implementation
//!
//! ## Usage
//!
//! ```rust
//! use league_store::{ContestantName, InMemoryLeagueStore, LeagueStore, RosterPick};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryLeagueStore::new();
//!     let queen = ContestantName::parse("Bob the Drag Queen")?;
//!
//!     store.record_raw_score(&queen, 1, Decimal::new(35, 1)).await?;
//!     store.replace_roster(7, 1, 1, &[RosterPick { contestant: queen, rank: 1 }]).await?;
//!
//!     assert_eq!(store.list_roster_entries(1).await?.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod postgres;
pub mod types;

pub use backend::{touched_pairs, EpisodeLock, InMemoryLeagueStore, LeagueStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use postgres::PgLeagueStore;
pub use types::*;

/// Re-export the decimal type used for all points
pub use rust_decimal::Decimal;
