//! Rank multiplier resolution
//!
//! Settings hold multipliers as strings under `rank_<n>_multiplier`. The
//! resolver turns whatever subset is present into a complete table for ranks
//! 1 through 4, falling back to fixed defaults for missing or bad values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use league_store::Rank;

use crate::error::RecalcError;

/// Ranks the resolver always defines
pub const DEFINED_RANKS: std::ops::RangeInclusive<Rank> = 1..=4;

/// Operator-supplied multipliers that replace resolved values for one run
pub type MultiplierOverride = BTreeMap<Rank, Decimal>;

/// Setting key holding the multiplier for a rank
pub fn setting_key(rank: Rank) -> String {
    format!("rank_{rank}_multiplier")
}

/// Built-in multiplier for a defined rank
pub fn default_multiplier(rank: Rank) -> Option<Decimal> {
    match rank {
        1 => Some(Decimal::new(20, 1)),
        2 => Some(Decimal::new(15, 1)),
        3 => Some(Decimal::new(125, 2)),
        4 => Some(Decimal::ONE),
        _ => None,
    }
}

/// A setting value that could not be used and was replaced by the default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Complete rank to multiplier mapping for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierTable {
    by_rank: BTreeMap<Rank, Decimal>,
}

impl Default for MultiplierTable {
    fn default() -> Self {
        let by_rank = DEFINED_RANKS
            .filter_map(|rank| default_multiplier(rank).map(|m| (rank, m)))
            .collect();
        Self { by_rank }
    }
}

impl MultiplierTable {
    /// Multiplier for a rank; ranks without an entry score at 1.0
    pub fn get(&self, rank: Rank) -> Decimal {
        self.by_rank.get(&rank).copied().unwrap_or(Decimal::ONE)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, Decimal)> + '_ {
        self.by_rank.iter().map(|(&rank, &m)| (rank, m))
    }

    /// Replace entries with operator overrides
    pub fn with_override(mut self, overrides: &MultiplierOverride) -> Result<Self, RecalcError> {
        validate_override(overrides)?;
        for (&rank, &multiplier) in overrides {
            self.by_rank.insert(rank, multiplier);
        }
        Ok(self)
    }
}

/// Table plus the setting values that were rejected on the way
#[derive(Debug, Clone)]
pub struct Resolution {
    pub table: MultiplierTable,
    pub issues: Vec<ConfigIssue>,
}

/// Build the multiplier table from sparse settings. Never fails.
pub fn resolve(settings: &HashMap<String, String>) -> Resolution {
    let mut table = MultiplierTable::default();
    let mut issues = Vec::new();

    for rank in DEFINED_RANKS {
        let key = setting_key(rank);
        let Some(raw) = settings.get(&key) else {
            continue;
        };

        match Decimal::from_str(raw.trim()) {
            Ok(value) if value > Decimal::ZERO => {
                table.by_rank.insert(rank, value.normalize());
            }
            Ok(_) => issues.push(ConfigIssue {
                key,
                value: raw.clone(),
                reason: "multiplier must be positive".to_string(),
            }),
            Err(e) => issues.push(ConfigIssue { key, value: raw.clone(), reason: e.to_string() }),
        }
    }

    for issue in &issues {
        tracing::warn!(
            "Ignoring setting {}={:?} ({}), using default multiplier",
            issue.key,
            issue.value,
            issue.reason
        );
    }

    Resolution { table, issues }
}

/// Reject override entries that could never be valid multipliers
pub fn validate_override(overrides: &MultiplierOverride) -> Result<(), RecalcError> {
    for (&rank, &multiplier) in overrides {
        if rank < 1 {
            return Err(RecalcError::config(format!("override rank {rank} must be at least 1")));
        }
        if multiplier <= Decimal::ZERO {
            return Err(RecalcError::config(format!(
                "override multiplier for rank {rank} must be positive, got {multiplier}"
            )));
        }
    }
    Ok(())
}

/// Parse one `rank=multiplier` override entry, e.g. `1=2.5`
pub fn parse_override_entry(raw: &str) -> Result<(Rank, Decimal), RecalcError> {
    let (rank, multiplier) = raw
        .split_once('=')
        .ok_or_else(|| RecalcError::config(format!("expected rank=multiplier, got {raw:?}")))?;

    let rank: Rank = rank
        .trim()
        .parse()
        .map_err(|_| RecalcError::config(format!("invalid rank in {raw:?}")))?;
    let multiplier = Decimal::from_str(multiplier.trim())
        .map_err(|_| RecalcError::config(format!("invalid multiplier in {raw:?}")))?;

    let entry = MultiplierOverride::from([(rank, multiplier)]);
    validate_override(&entry)?;
    Ok((rank, multiplier))
}
