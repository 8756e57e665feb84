//! Ergrank - Context-Aware Erg Recommendation
//!
//! Recommends ergs (short interventions shown to a user) for a context made
//! of a use case, a step within it, the user's detected emotion and what
//! caused it. Every evaluation a user gives is stored, and once each erg in
//! the context's catalog has enough evaluations a model is retrained that
//! predicts how each erg would be evaluated.
//!
//! # Architecture
//!
//! - **Types**: contexts, catalogs, dataset rows
//! - **Catalog**: static registry of ergs per context
//! - **Storage**: per-context datasets and versioned models in libSQL
//! - **Learning**: training gate, random forest, trainer, predictor
//! - **Engine**: feedback ingestion and recommendation entry points
//!
//! # Example
//!
//! ```ignore
//! use ergrank_core::{ContextKey, Emotion, EmotionCause, ErgConfig, ErgEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ErgConfig::load(Some("ergrank.toml".as_ref()))?;
//!     let engine = ErgEngine::from_config(&config).await?;
//!     let context = ContextKey::new(3, 1, Emotion::Angry, EmotionCause::Retail);
//!
//!     let recommendation = engine.recommend(&context).await?;
//!     engine
//!         .ingest_feedback(&context, &recommendation.ergs[0], &[4, 5, 3])
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod learning;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use catalog::{CatalogProvider, StaticCatalogProvider};
pub use config::{ErgConfig, FallbackSampling, TrainingMode};
pub use engine::{ContextStatus, ErgEngine, FeedbackOutcome, TrainingStatus};
pub use error::{ErgError, Result};
pub use learning::{
    ForestParams, ModelArtifact, ModelTrainer, Predictor, Readiness, Recommendation, Strategy,
    TrainOutcome, TrainingGate,
};
pub use storage::{storage_key, DatasetStore, LibsqlErgStore, ModelStore};
pub use types::{Catalog, ContextKey, DataPoint, Dataset, Emotion, EmotionCause};
