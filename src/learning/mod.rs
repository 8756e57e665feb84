//! Per-context learning loop
//!
//! - [`gate`]: decides when a context has enough balanced data to train
//! - [`forest`]: multi-output random forest regressor
//! - [`model`]: persisted model artifact and erg ranking
//! - [`trainer`]: batch training and model persistence
//! - [`predictor`]: model-based ranking with a random fallback

pub mod forest;
pub mod gate;
pub mod model;
pub mod predictor;
pub mod trainer;

pub use forest::{ForestParams, RandomForest};
pub use gate::{Readiness, TrainingGate};
pub use model::{ModelArtifact, ModelEnvelope, ScoredErg};
pub use predictor::{Predictor, Recommendation, Strategy};
pub use trainer::{ModelTrainer, TrainOutcome, TrainingReport};
