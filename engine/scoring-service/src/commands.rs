//! Command execution against a league store

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use league_store::{ContestantName, EpisodeScore, LeagueStore, StandingsEntry};
use scoring_engine::{multiplier, EngineConfig, MultiplierOverride, RecalcEngine, RunResult};

use crate::cli::Command;

/// Result of one command, printable as text or JSON
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutput {
    Run(RunResult),
    Standings { entries: Vec<StandingsEntry> },
    EpisodeScores { scores: Vec<EpisodeScore> },
    Mvp { contestant: Option<ContestantName>, total: Option<Decimal> },
    Message { message: String },
}

impl CommandOutput {
    fn message(message: impl Into<String>) -> Self {
        CommandOutput::Message { message: message.into() }
    }

    /// Whether the command achieved what was asked
    pub fn is_success(&self) -> bool {
        match self {
            CommandOutput::Run(result) => result.is_success(),
            _ => true,
        }
    }

    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            return serde_json::to_string_pretty(self).context("Failed to serialize output");
        }

        let mut out = String::new();
        match self {
            CommandOutput::Run(result) => {
                writeln!(out, "Episode {}: {:?} ({:?})", result.episode, result.status, result.phase)?;
                if let Some(phase) = result.failed_during {
                    writeln!(out, "  failed during: {phase}")?;
                }
                writeln!(out, "  scores written: {}", result.rows_updated)?;
                writeln!(out, "  scores removed: {}", result.rows_removed)?;
                writeln!(out, "  standings rows: {}", result.standings_updated)?;
                for issue in &result.config_issues {
                    writeln!(out, "  ignored {}={:?}: {}", issue.key, issue.value, issue.reason)?;
                }
                if let Some(error) = &result.error {
                    writeln!(out, "  error: {error}")?;
                }
                write!(out, "  took {:?}", result.duration)?;
            }
            CommandOutput::Standings { entries } => {
                writeln!(out, "{:>4}  {:>8}  {:>8}  {:>10}", "#", "user", "league", "total")?;
                for (place, entry) in entries.iter().enumerate() {
                    writeln!(
                        out,
                        "{:>4}  {:>8}  {:>8}  {:>10}",
                        place + 1,
                        entry.user_id,
                        entry.league_id,
                        entry.total_score
                    )?;
                }
            }
            CommandOutput::EpisodeScores { scores } => {
                for score in scores {
                    writeln!(
                        out,
                        "league {} rank {:>2}  {:<30} {:>8}",
                        score.league_id, score.rank, score.contestant, score.calculated_points
                    )?;
                }
            }
            CommandOutput::Mvp { contestant: Some(contestant), total: Some(total) } => {
                write!(out, "{contestant} ({total} points)")?;
            }
            CommandOutput::Mvp { .. } => out.push_str("No scored contestants yet"),
            CommandOutput::Message { message } => out.push_str(message),
        }
        Ok(out.trim_end().to_string())
    }
}

/// Execute a store command. `Migrate` needs a Postgres store and is handled by the caller.
pub async fn execute(
    command: Command,
    store: Arc<dyn LeagueStore>,
    engine_config: EngineConfig,
) -> Result<CommandOutput> {
    match command {
        Command::Recalculate { episode, multipliers, strategy } => {
            let mut config = engine_config;
            if let Some(strategy) = strategy {
                config.rebuild_strategy = strategy;
            }

            let overrides: Option<MultiplierOverride> =
                (!multipliers.is_empty()).then(|| multipliers.into_iter().collect());

            let engine = RecalcEngine::new(store, config).context("Failed to create engine")?;
            let result = engine.recalculate(episode, overrides.as_ref()).await;
            Ok(CommandOutput::Run(result))
        }

        Command::Standings { league } => {
            let entries = store.read_standings(league).await.context("Failed to read standings")?;
            Ok(CommandOutput::Standings { entries })
        }

        Command::EpisodeScores { user, episode, league } => {
            let scores = store
                .read_episode_scores(user, episode, league)
                .await
                .context("Failed to read episode scores")?;
            Ok(CommandOutput::EpisodeScores { scores })
        }

        Command::Mvp { user, league } => {
            let mvp = store.read_mvp(user, league).await.context("Failed to read MVP")?;
            let (contestant, total) = mvp.unzip();
            Ok(CommandOutput::Mvp { contestant, total })
        }

        Command::SubmitRoster { user, league, episode, picks } => {
            let count = store
                .replace_roster(user, league, episode, &picks)
                .await
                .context("Failed to submit roster")?;
            tracing::info!("User {} league {} episode {}: {} picks", user, league, episode, count);
            Ok(CommandOutput::message(format!(
                "Roster for user {user} in league {league}, episode {episode}: {count} picks"
            )))
        }

        Command::RecordScore { contestant, episode, points } => {
            let contestant = ContestantName::parse(&contestant)?;
            store
                .record_raw_score(&contestant, episode, points)
                .await
                .context("Failed to record score")?;
            Ok(CommandOutput::message(format!(
                "Recorded {points} for {contestant} in episode {episode}"
            )))
        }

        Command::SetMultiplier { rank, value } => {
            let entry = MultiplierOverride::from([(rank, value)]);
            multiplier::validate_override(&entry)?;

            let key = multiplier::setting_key(rank);
            store
                .write_setting(&key, &value.normalize().to_string())
                .await
                .context("Failed to write setting")?;
            Ok(CommandOutput::message(format!("{key} = {}", value.normalize())))
        }

        Command::Migrate => bail!("migrate must run against the Postgres store"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_store::InMemoryLeagueStore;
    use scoring_engine::RunStatus;
    use std::str::FromStr;

    fn dec(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap()
    }

    async fn run(store: &Arc<InMemoryLeagueStore>, command: Command) -> CommandOutput {
        execute(command, store.clone(), EngineConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_operator_workflow() {
        let store = Arc::new(InMemoryLeagueStore::new());

        run(&store, Command::SetMultiplier { rank: 1, value: dec("2.50") }).await;
        for points in ["3", "4"] {
            let command = Command::RecordScore {
                contestant: " raja ".to_string(),
                episode: 1,
                points: dec(points),
            };
            run(&store, command).await;
        }
        let picks = vec![crate::cli::parse_pick("1=Raja").unwrap()];
        run(&store, Command::SubmitRoster { user: 7, league: 1, episode: 1, picks }).await;

        let output = run(
            &store,
            Command::Recalculate { episode: 1, multipliers: Vec::new(), strategy: None },
        )
        .await;
        match &output {
            CommandOutput::Run(result) => {
                assert_eq!(result.status, RunStatus::Completed);
                assert_eq!(result.rows_updated, 1);
            }
            other => panic!("Unexpected output: {other:?}"),
        }
        assert!(output.is_success());

        match run(&store, Command::Standings { league: Some(1) }).await {
            CommandOutput::Standings { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].total_score, dec("17.5"));
            }
            other => panic!("Unexpected output: {other:?}"),
        }

        match run(&store, Command::Mvp { user: 7, league: 1 }).await {
            CommandOutput::Mvp { contestant, total } => {
                assert_eq!(contestant, Some(ContestantName::parse("RAJA").unwrap()));
                assert_eq!(total, Some(dec("17.5")));
            }
            other => panic!("Unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recalculate_with_override_and_strategy() {
        let store = Arc::new(InMemoryLeagueStore::new());
        let queen = ContestantName::parse("Raja").unwrap();
        store.record_raw_score(&queen, 2, dec("4")).await.unwrap();
        store
            .replace_roster(7, 1, 2, &[league_store::RosterPick { contestant: queen, rank: 1 }])
            .await
            .unwrap();

        let command = Command::Recalculate {
            episode: 2,
            multipliers: vec![(1, dec("2.5"))],
            strategy: Some(scoring_engine::RebuildStrategy::Incremental),
        };
        let output = run(&store, command).await;
        assert!(output.is_success());

        let scores = store.read_episode_scores(7, 2, None).await.unwrap();
        assert_eq!(scores[0].calculated_points, dec("10"));

        let text = output.render(false).unwrap();
        assert!(text.starts_with("Episode 2: Completed"));
        let json = output.render(true).unwrap();
        assert!(json.contains("\"kind\": \"run\""));
    }

    #[tokio::test]
    async fn test_invalid_inputs_are_errors() {
        let store: Arc<dyn LeagueStore> = Arc::new(InMemoryLeagueStore::new());

        let command = Command::SetMultiplier { rank: 1, value: dec("0") };
        assert!(execute(command, store.clone(), EngineConfig::default()).await.is_err());

        let command =
            Command::RecordScore { contestant: "\u{7}".to_string(), episode: 1, points: dec("1") };
        assert!(execute(command, store.clone(), EngineConfig::default()).await.is_err());

        assert!(execute(Command::Migrate, store.clone(), EngineConfig::default()).await.is_err());
        assert!(store.read_settings().await.unwrap().is_empty());
    }

    #[test]
    fn test_render_empty_mvp() {
        let output = CommandOutput::Mvp { contestant: None, total: None };
        assert_eq!(output.render(false).unwrap(), "No scored contestants yet");
    }
}
