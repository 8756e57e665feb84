//! Configuration for ergrank
//!
//! Settings are read from an optional TOML file and then overridden by
//! environment variables of the form `ERGRANK__SECTION__KEY`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [storage]
//! db_path = "/var/lib/ergrank/ergrank.db"
//!
//! [catalog]
//! path = "ergs.toml"
//!
//! [feedback]
//! min_score = 1
//! max_score = 5
//!
//! [training]
//! min_rows_per_erg = 20
//! mode = "inline"
//! holdout_fraction = 0.25
//!
//! [training.forest]
//! n_trees = 100
//! seed = 0
//!
//! [recommendation]
//! count = 5
//! sampling = "with_replacement"
//! ```

use crate::error::{ErgError, Result};
use crate::learning::forest::ForestParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable consulted for the database path
pub const DB_PATH_ENV: &str = "ERGRANK_DB_PATH";

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErgConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub feedback: FeedbackSettings,

    #[serde(default)]
    pub training: TrainingSettings,

    #[serde(default)]
    pub recommendation: RecommendationSettings,
}

/// Where datasets and models are persisted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file; falls back to `ERGRANK_DB_PATH`, then the data dir
    #[serde(default)]
    pub db_path: Option<String>,
}

impl StorageSettings {
    pub fn resolve_db_path(&self) -> String {
        self.db_path
            .clone()
            .or_else(|| std::env::var(DB_PATH_ENV).ok().filter(|p| !p.is_empty()))
            .unwrap_or_else(|| default_db_path().to_string_lossy().to_string())
    }
}

/// Get the default database path using the platform data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ergrank")
        .join("ergrank.db")
}

/// Catalog registry location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("ergs.toml")
}

/// Bounds for ordinal survey scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSettings {
    #[serde(default = "default_min_score")]
    pub min_score: u8,

    #[serde(default = "default_max_score")]
    pub max_score: u8,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_score: default_max_score(),
        }
    }
}

fn default_min_score() -> u8 {
    1
}

fn default_max_score() -> u8 {
    5
}

/// When retraining runs relative to feedback ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Retrain before `ingest_feedback` returns
    #[default]
    Inline,
    /// Retrain on a spawned task
    Background,
}

/// Training gate and model fitting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Rows required for every erg before a model is fitted
    #[serde(default = "default_min_rows_per_erg")]
    pub min_rows_per_erg: usize,

    #[serde(default)]
    pub mode: TrainingMode,

    /// Share of rows held out to measure the fitted model; 0 disables
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f64,

    #[serde(default)]
    pub forest: ForestParams,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            min_rows_per_erg: default_min_rows_per_erg(),
            mode: TrainingMode::default(),
            holdout_fraction: default_holdout_fraction(),
            forest: ForestParams::default(),
        }
    }
}

fn default_min_rows_per_erg() -> usize {
    20
}

fn default_holdout_fraction() -> f64 {
    0.25
}

/// How the bootstrap phase samples ergs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSampling {
    /// Exactly `count` independent draws; repeats possible
    #[default]
    WithReplacement,
    /// Up to `count` distinct ergs
    WithoutReplacement,
}

/// Recommendation output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSettings {
    #[serde(default = "default_count")]
    pub count: usize,

    #[serde(default)]
    pub sampling: FallbackSampling,

    /// Fixed seed for the random fallback; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            count: default_count(),
            sampling: FallbackSampling::default(),
            seed: None,
        }
    }
}

fn default_count() -> usize {
    5
}

impl ErgConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ErgError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Config file not found: {:?}", path),
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ERGRANK")
                .separator("__")
                .try_parsing(true),
        );

        let config: ErgConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        match path {
            Some(path) => tracing::info!("Loaded configuration from {:?}", path),
            None => tracing::debug!("Using default configuration"),
        }
        Ok(config)
    }

    /// Reject settings the learning loop cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ErgError::Config(config::ConfigError::Message(msg)));

        if self.feedback.min_score > self.feedback.max_score {
            return invalid(format!(
                "feedback.min_score ({}) exceeds feedback.max_score ({})",
                self.feedback.min_score, self.feedback.max_score
            ));
        }
        if self.training.min_rows_per_erg == 0 {
            return invalid("training.min_rows_per_erg must be at least 1".to_string());
        }
        if !(0.0..=0.5).contains(&self.training.holdout_fraction) {
            return invalid(format!(
                "training.holdout_fraction must be within [0, 0.5], got {}",
                self.training.holdout_fraction
            ));
        }
        if self.training.forest.n_trees == 0 {
            return invalid("training.forest.n_trees must be at least 1".to_string());
        }
        if self.recommendation.count == 0 {
            return invalid("recommendation.count must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ErgConfig::default();
        assert_eq!(config.training.min_rows_per_erg, 20);
        assert_eq!(config.recommendation.count, 5);
        assert_eq!(config.feedback.min_score, 1);
        assert_eq!(config.feedback.max_score, 5);
        assert_eq!(config.training.mode, TrainingMode::Inline);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[training]
min_rows_per_erg = 3
mode = "background"

[training.forest]
n_trees = 7

[recommendation]
sampling = "without_replacement"
seed = 42
"#
        )
        .unwrap();

        let config = ErgConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.training.min_rows_per_erg, 3);
        assert_eq!(config.training.mode, TrainingMode::Background);
        assert_eq!(config.training.forest.n_trees, 7);
        assert_eq!(
            config.recommendation.sampling,
            FallbackSampling::WithoutReplacement
        );
        assert_eq!(config.recommendation.seed, Some(42));
        // untouched sections keep defaults
        assert_eq!(config.recommendation.count, 5);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ErgConfig::load(Some(Path::new("/nonexistent/ergrank.toml")));
        assert!(matches!(result, Err(ErgError::Io(_))));
    }

    #[test]
    fn test_validation() {
        let mut config = ErgConfig::default();
        config.feedback.min_score = 6;
        assert!(config.validate().is_err());

        let mut config = ErgConfig::default();
        config.training.holdout_fraction = 0.9;
        assert!(config.validate().is_err());

        let mut config = ErgConfig::default();
        config.recommendation.count = 0;
        assert!(config.validate().is_err());
    }
}
