//! Drag League Scoring Service
//!
//! Operator tooling around the recalculation engine: configuration loading,
//! logging setup and the `scoring-recalc` command set.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

pub use cli::{Cli, Command};
pub use commands::{execute, CommandOutput};
pub use config::{load_config, LoggingConfig, ServiceConfig};
pub use logging::initialize_logging;
