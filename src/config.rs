//! Configuration management for the risk scoring service

use crate::models::scorer::ScoringPolicy;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "RISK_SCORE_CONFIG";

/// Prefix for per-key environment overrides, e.g. `RISK_SCORE__NATS__URL`
const ENV_PREFIX: &str = "RISK_SCORE";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub scoring: ScoringPolicy,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for named-field score requests
    pub score_subject: String,
    /// Subject for positional feature label requests
    #[serde(default = "default_predict_subject")]
    pub predict_subject: String,
    /// Subject for health checks
    #[serde(default = "default_health_subject")]
    pub health_subject: String,
}

fn default_predict_subject() -> String {
    "risk.predict".to_string()
}

fn default_health_subject() -> String {
    "risk.health".to_string()
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Classifier artifact (`.onnx` or `.json`)
    pub classifier_path: String,
    /// Scaler artifact (`.json`)
    pub scaler_path: String,
    /// Name reported in logs and health replies
    #[serde(default = "default_classifier_name")]
    pub classifier_name: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

fn default_classifier_name() -> String {
    "random_forest".to_string()
}

/// Request handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
    /// Interval between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `RISK_SCORE_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        if self.pipeline.metrics_interval_secs == 0 {
            anyhow::bail!("pipeline.metrics_interval_secs must be at least 1");
        }
        self.scoring
            .validate()
            .context("Invalid [scoring] configuration")?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                score_subject: "risk.score".to_string(),
                predict_subject: default_predict_subject(),
                health_subject: default_health_subject(),
            },
            models: ModelsConfig {
                classifier_path: "models/random_forest.onnx".to_string(),
                scaler_path: "models/scaler.json".to_string(),
                classifier_name: default_classifier_name(),
                onnx_threads: 1,
            },
            scoring: ScoringPolicy::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.score_subject, "risk.score");
        assert_eq!(config.models.classifier_name, "random_forest");
        assert_eq!(config.scoring, ScoringPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let path = std::env::temp_dir().join(format!(
            "risk_score_service_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[nats]
url = "nats://nats:4222"
score_subject = "scores"

[models]
classifier_path = "models/model.json"
scaler_path = "models/scaler.json"

[scoring]
variance_bound = 4.0

[pipeline]
workers = 2

[logging]
level = "debug"
format = "pretty"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();

        assert_eq!(config.nats.score_subject, "scores");
        assert_eq!(config.nats.predict_subject, "risk.predict");
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.scoring.variance_bound, 4.0);
        assert_eq!(config.scoring.floor, 60.0);
        assert_eq!(config.pipeline.metrics_interval_secs, 30);
    }

    #[test]
    fn test_invalid_scoring_bounds_fail_validation() {
        let mut config = AppConfig::default();
        config.scoring.floor = 99.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());
    }
}
