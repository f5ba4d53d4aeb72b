//! `scoring-recalc` entry point
//!
//! Loads configuration, connects to the league database and runs one
//! operator command.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use league_store::{LeagueStore, PgLeagueStore};
use scoring_service::{execute, initialize_logging, load_config, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    initialize_logging(&config.logging)?;
    info!("Starting scoring-recalc v{}", env!("CARGO_PKG_VERSION"));

    let store = PgLeagueStore::connect(&config.store)
        .await
        .context("Failed to connect to the league database")?;

    if let Command::Migrate = cli.command {
        store.migrate().await.context("Failed to apply migrations")?;
        println!("Migrations applied");
        return Ok(());
    }

    let store: Arc<dyn LeagueStore> = Arc::new(store);
    let output = execute(cli.command, store, config.engine).await?;
    println!("{}", output.render(cli.json)?);

    if !output.is_success() {
        bail!("Recalculation did not complete");
    }
    Ok(())
}
