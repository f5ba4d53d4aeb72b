//! Command line interface for `scoring-recalc`

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use league_store::{ContestantName, EpisodeNumber, LeagueId, Rank, RosterPick, StoreError, UserId};
use scoring_engine::{multiplier, RebuildStrategy, RecalcError};

#[derive(Debug, Parser)]
#[command(name = "scoring-recalc")]
#[command(about = "Recalculate Drag League episode scores and season standings")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file (defaults to ./scoring.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Recalculate one episode and republish standings
    Recalculate {
        /// Episode number
        #[arg(short, long)]
        episode: EpisodeNumber,

        /// Multiplier override for this run, as rank=multiplier (repeatable)
        #[arg(short, long = "multiplier", value_parser = parse_multiplier)]
        multipliers: Vec<(Rank, Decimal)>,

        /// Standings rebuild strategy (full, incremental)
        #[arg(long)]
        strategy: Option<RebuildStrategy>,
    },

    /// Show season standings
    Standings {
        /// Restrict to one league
        #[arg(short, long)]
        league: Option<LeagueId>,
    },

    /// Show a user's scores for one episode
    EpisodeScores {
        #[arg(short, long)]
        user: UserId,

        #[arg(short, long)]
        episode: EpisodeNumber,

        #[arg(short, long)]
        league: Option<LeagueId>,
    },

    /// Show a user's highest scoring contestant in a league
    Mvp {
        #[arg(short, long)]
        user: UserId,

        #[arg(short, long)]
        league: LeagueId,
    },

    /// Replace a user's roster for an episode
    SubmitRoster {
        #[arg(short, long)]
        user: UserId,

        #[arg(short, long)]
        league: LeagueId,

        #[arg(short, long)]
        episode: EpisodeNumber,

        /// Pick as rank=contestant (repeatable); none clears the roster
        #[arg(short, long = "pick", value_parser = parse_pick)]
        picks: Vec<RosterPick>,
    },

    /// Record a raw box score event for a contestant
    RecordScore {
        #[arg(short = 'n', long)]
        contestant: String,

        #[arg(short, long)]
        episode: EpisodeNumber,

        #[arg(short, long, allow_hyphen_values = true)]
        points: Decimal,
    },

    /// Persist the multiplier for a roster rank
    SetMultiplier {
        #[arg(short, long)]
        rank: Rank,

        #[arg(short, long)]
        value: Decimal,
    },

    /// Apply database migrations
    Migrate,
}

/// Parse `rank=multiplier`, e.g. `1=2.5`
pub fn parse_multiplier(raw: &str) -> Result<(Rank, Decimal), RecalcError> {
    multiplier::parse_override_entry(raw)
}

/// Parse `rank=contestant`, e.g. `1=Bob the Drag Queen`
pub fn parse_pick(raw: &str) -> Result<RosterPick, StoreError> {
    let (rank, contestant) = raw
        .split_once('=')
        .ok_or_else(|| StoreError::invalid_roster(format!("expected rank=contestant, got {raw:?}")))?;

    let rank = rank
        .trim()
        .parse()
        .map_err(|_| StoreError::invalid_roster(format!("invalid rank in {raw:?}")))?;
    let contestant = ContestantName::parse(contestant)?;

    Ok(RosterPick { contestant, rank })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::str::FromStr;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_recalculate_with_overrides() {
        let cli = Cli::try_parse_from([
            "scoring-recalc",
            "recalculate",
            "--episode",
            "3",
            "-m",
            "1=2.5",
            "-m",
            "5=0.75",
            "--strategy",
            "incremental",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Recalculate { episode, multipliers, strategy } => {
                assert_eq!(episode, 3);
                assert_eq!(
                    multipliers,
                    vec![
                        (1, Decimal::from_str("2.5").unwrap()),
                        (5, Decimal::from_str("0.75").unwrap())
                    ]
                );
                assert_eq!(strategy, Some(RebuildStrategy::Incremental));
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_bad_multiplier_is_rejected_by_parser() {
        let result =
            Cli::try_parse_from(["scoring-recalc", "recalculate", "-e", "1", "-m", "1=-2"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["scoring-recalc", "recalculate", "-e", "1", "-m", "2.5"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_pick_normalizes_contestant() {
        let pick = parse_pick("2=  Bianca   Del Rio ").unwrap();
        assert_eq!(pick.rank, 2);
        assert_eq!(pick.contestant.as_str(), "Bianca Del Rio");

        assert!(parse_pick("Bianca Del Rio").is_err());
        assert!(parse_pick("x=Bianca Del Rio").is_err());
        assert!(parse_pick("1=   ").is_err());
    }

    #[test]
    fn test_parse_submit_roster() {
        let cli = Cli::try_parse_from([
            "scoring-recalc",
            "submit-roster",
            "-u",
            "7",
            "-l",
            "1",
            "-e",
            "2",
            "-p",
            "1=Jinkx Monsoon",
            "-p",
            "2=Sasha Velour",
        ])
        .unwrap();

        match cli.command {
            Command::SubmitRoster { user, league, episode, picks } => {
                assert_eq!((user, league, episode), (7, 1, 2));
                assert_eq!(picks.len(), 2);
                assert_eq!(picks[1].contestant.as_str(), "Sasha Velour");
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }
}
