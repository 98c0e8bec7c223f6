use chrono::NaiveDate;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rl::config::{DqnConfig, TrainingConfig};
use crate::rl::environment::TradingEnvConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: TradingEnvConfig,
    pub agent: DqnConfig,
    pub training: TrainingConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Feature CSV path
    pub path: Option<String>,
    /// Rows dated before this train, rows on/after it are held out
    pub split_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/research.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PLOY_DQN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PLOY_DQN__AGENT__GAMMA, etc.)
            .add_source(
                Environment::with_prefix("PLOY_DQN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration, collecting every violation
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        errors.extend(self.environment.validate());
        errors.extend(self.agent.validate());
        errors.extend(self.training.validate());

        if self.training.episodes == 0 {
            errors.push("training.episodes must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
