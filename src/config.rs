use crate::error::{AppError, Result};
use crate::ml::models::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Training and inference configuration
    #[serde(default)]
    pub ml: MlConfig,

    /// Sensor record store configuration
    #[serde(default)]
    pub records: RecordsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());
        Self::load_from(&config_path, Self::environment())
    }

    /// Environment overrides, e.g. `WQM__ML__ARTIFACT_PATH`.
    ///
    /// The `__` separator also sits between the prefix and the first section.
    pub fn environment() -> config::Environment {
        config::Environment::with_prefix("WQM")
            .separator("__")
            .try_parsing(true)
    }

    /// Layer the embedded defaults, `config_path` if it exists, then `environment`
    pub fn load_from(
        config_path: &str,
        environment: config::Environment,
    ) -> std::result::Result<Self, config::ConfigError> {
        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let training = &self.ml.training;
        if !(training.test_fraction > 0.0 && training.test_fraction < 1.0) {
            return Err(AppError::Configuration(format!(
                "ml.training.test_fraction must be in (0, 1), got {}",
                training.test_fraction
            )));
        }
        if training.rounds == 0 {
            return Err(AppError::Configuration(
                "ml.training.rounds must be at least 1".to_string(),
            ));
        }
        if training.trees_per_round == 0 {
            return Err(AppError::Configuration(
                "ml.training.trees_per_round must be at least 1".to_string(),
            ));
        }
        if (training.trees_per_round as usize).saturating_mul(training.rounds) > u16::MAX as usize {
            return Err(AppError::Configuration(format!(
                "rounds * trees_per_round must not exceed {}",
                u16::MAX
            )));
        }
        if self.records.backend == RecordBackend::Csv && self.records.path.is_none() {
            return Err(AppError::Configuration(
                "records.path is required for the csv backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlConfig {
    /// Tabular training dataset (CSV)
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Artifact bundle location
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Warm the artifact cache when the server starts
    #[serde(default = "default_true")]
    pub load_on_startup: bool,

    /// Training hyperparameters
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            artifact_path: default_artifact_path(),
            load_on_startup: default_true(),
            training: TrainingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Record store backend
    #[serde(default)]
    pub backend: RecordBackend,

    /// Path for the CSV log
    #[serde(default = "default_records_path")]
    pub path: Option<PathBuf>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            backend: RecordBackend::default(),
            path: default_records_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordBackend {
    #[default]
    Csv,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/training.csv")
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("data/ml_artifacts.bin")
}

fn default_records_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/readings.csv"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "water-quality-monitor".to_string()
}

fn default_true() -> bool {
    true
}
