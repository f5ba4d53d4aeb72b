//! Service configuration management

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use league_store::StoreConfig;
use scoring_engine::EngineConfig;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "scoring";

/// Prefix for environment overrides, e.g. `SCORING__ENGINE__REBUILD_STRATEGY`
pub const ENV_PREFIX: &str = "SCORING";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// League store configuration
    pub store: StoreConfig,

    /// Recalculation engine configuration
    pub engine: EngineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "compact".to_string() }
    }
}

/// Load configuration from an optional TOML file and the environment.
///
/// Sources, lowest precedence first: built-in defaults, the config file,
/// `SCORING__*` variables, then `DATABASE_URL`.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let file = match path {
        Some(path) => {
            tracing::debug!("Loading configuration from file: {:?}", path);
            config::File::from(path).format(config::FileFormat::Toml).required(true)
        }
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
        .build()
        .context("Failed to read configuration sources")?;

    let mut config: ServiceConfig =
        settings.try_deserialize().context("Failed to parse configuration")?;

    load_from_env(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Apply conventional variables that sit outside the `SCORING__` namespace
fn load_from_env(config: &mut ServiceConfig) {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.store.database_url = url;
    }
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.store.validate().map_err(anyhow::Error::msg).context("Invalid store configuration")?;
    config.engine.validate().context("Invalid engine configuration")?;

    match config.logging.format.as_str() {
        "json" | "pretty" | "compact" => {}
        other => bail!("Unknown log format: {other}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoring_engine::RebuildStrategy;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.engine.rebuild_strategy, RebuildStrategy::Full);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[engine]
rebuild_strategy = "incremental"
parallel_threshold = 64

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.engine.rebuild_strategy, RebuildStrategy::Incremental);
        assert_eq!(config.engine.parallel_threshold, 64);
        assert_eq!(config.engine.points_scale, scoring_engine::DEFAULT_POINTS_SCALE);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.store.max_connections, StoreConfig::default().max_connections);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nformat = \"xml\"").unwrap();
        assert!(load_config(Some(file.path())).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nrebuild_strategy = \"sometimes\"").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
