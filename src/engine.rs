//! Feedback ingestion and recommendation entry points
//!
//! `ErgEngine` ties the catalog registry, the dataset and model stores, the
//! training gate, the trainer and the predictor together. Writes for one
//! context (appends and retraining) are serialized by a per-context lock;
//! different contexts never contend. `recommend` takes no lock: model
//! replacement is a single-row upsert, so a reader sees either the old
//! model or the new one.

use crate::catalog::{CatalogProvider, StaticCatalogProvider};
use crate::config::{ErgConfig, FeedbackSettings, TrainingMode};
use crate::error::{ErgError, Result};
use crate::learning::gate::{Readiness, TrainingGate};
use crate::learning::predictor::{Predictor, Recommendation};
use crate::learning::trainer::{ModelTrainer, TrainOutcome, TrainingReport};
use crate::storage::{DatasetStore, LibsqlErgStore, ModelStore};
use crate::types::{Catalog, ContextKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened to training after a feedback row was stored
#[derive(Debug)]
pub enum TrainingStatus {
    /// Gate not satisfied yet
    NotReady(Readiness),
    /// Model refitted before returning
    Trained(TrainingReport),
    /// Training handed to a background task
    Scheduled(JoinHandle<Result<TrainOutcome>>),
    /// Row stored, but retraining failed; the previous model stays in place
    Failed(ErgError),
}

/// Result of ingesting one feedback event
#[derive(Debug)]
pub struct FeedbackOutcome {
    /// Rows stored for the context, including this one
    pub rows: usize,
    pub training: TrainingStatus,
}

/// Per-context status report
#[derive(Debug, Clone)]
pub struct ContextStatus {
    pub context: ContextKey,
    pub readiness: Readiness,
    pub has_model: bool,
    pub model_trained_rows: Option<usize>,
    pub model_trained_at: Option<i64>,
}

pub struct ErgEngine {
    catalogs: Arc<dyn CatalogProvider>,
    datasets: Arc<dyn DatasetStore>,
    trainer: ModelTrainer,
    predictor: Predictor,
    feedback: FeedbackSettings,
    mode: TrainingMode,
    locks: Mutex<HashMap<ContextKey, Arc<Mutex<()>>>>,
}

impl ErgEngine {
    pub fn new(
        catalogs: Arc<dyn CatalogProvider>,
        datasets: Arc<dyn DatasetStore>,
        models: Arc<dyn ModelStore>,
        config: &ErgConfig,
    ) -> Self {
        let gate = TrainingGate::new(config.training.min_rows_per_erg);
        let trainer = ModelTrainer::new(
            Arc::clone(&datasets),
            Arc::clone(&models),
            gate,
            config.training.forest.clone(),
            config.training.holdout_fraction,
        );
        let predictor = Predictor::new(models, config.recommendation.clone());

        Self {
            catalogs,
            datasets,
            trainer,
            predictor,
            feedback: config.feedback.clone(),
            mode: config.training.mode,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build an engine from configuration: catalog registry from
    /// `catalog.path`, libSQL store at the resolved database path
    pub async fn from_config(config: &ErgConfig) -> Result<Self> {
        let catalogs = StaticCatalogProvider::from_file(&config.catalog.path)?;
        let db_path = config.storage.resolve_db_path();
        let store = Arc::new(LibsqlErgStore::open(&db_path).await?);
        info!("Engine ready (database {}, training {:?})", db_path, config.training.mode);

        Ok(Self::new(Arc::new(catalogs), store.clone(), store, config))
    }

    /// Record the evaluation a user gave an erg, then retrain if ready
    pub async fn ingest_feedback(
        &self,
        context: &ContextKey,
        erg: &str,
        evaluation: &[u8],
    ) -> Result<FeedbackOutcome> {
        self.validate_evaluation(evaluation)?;
        let catalog = self.catalogs.catalog(context)?;
        if catalog.position(erg).is_none() {
            return Err(ErgError::UnknownErg {
                context: context.to_string(),
                erg: erg.to_string(),
            });
        }

        let lock = self.lock_for(context).await;
        let guard = lock.lock().await;

        let rows = self
            .datasets
            .append(context, &catalog, erg, evaluation)
            .await?;
        debug!("Stored feedback for {} on '{}' ({} rows)", context, erg, rows);

        let training = match self.mode {
            TrainingMode::Inline => {
                let outcome = self.trainer.train(context, &catalog).await;
                drop(guard);
                match outcome {
                    Ok(TrainOutcome::Skipped(readiness)) => TrainingStatus::NotReady(readiness),
                    Ok(TrainOutcome::Trained { report, .. }) => TrainingStatus::Trained(report),
                    Err(e) => {
                        warn!("Training failed for {} after storing row {}: {}", context, rows, e);
                        TrainingStatus::Failed(e)
                    }
                }
            }
            TrainingMode::Background => {
                drop(guard);
                TrainingStatus::Scheduled(self.spawn_training(*context, catalog, lock))
            }
        };

        Ok(FeedbackOutcome { rows, training })
    }

    /// Ordered erg recommendations for a context; never trains
    pub async fn recommend(&self, context: &ContextKey) -> Result<Recommendation> {
        let catalog = self.catalogs.catalog(context)?;
        let recommendation = self.predictor.recommend(context, &catalog).await;
        debug!(
            "Recommended {:?} for {} via {}",
            recommendation.ergs, context, recommendation.strategy
        );
        Ok(recommendation)
    }

    /// Run the gate and train now if it passes
    pub async fn train(&self, context: &ContextKey) -> Result<TrainOutcome> {
        let catalog = self.catalogs.catalog(context)?;
        let lock = self.lock_for(context).await;
        let _guard = lock.lock().await;
        self.trainer.train(context, &catalog).await
    }

    /// Per-erg row counts and whether a usable model exists
    pub async fn readiness(&self, context: &ContextKey) -> Result<ContextStatus> {
        let catalog = self.catalogs.catalog(context)?;
        let readiness = self
            .trainer
            .gate()
            .readiness(self.datasets.as_ref(), context, &catalog)
            .await?;

        let model = match self.predictor.load_model(context, &catalog).await {
            Ok(model) => Some(model),
            Err(ErgError::ModelUnavailable { reason, .. }) => {
                debug!("No usable model for {}: {}", context, reason);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(ContextStatus {
            context: *context,
            readiness,
            has_model: model.is_some(),
            model_trained_rows: model.as_ref().map(|m| m.trained_rows),
            model_trained_at: model.as_ref().map(|m| m.trained_at),
        })
    }

    pub fn catalog(&self, context: &ContextKey) -> Result<Arc<Catalog>> {
        self.catalogs.catalog(context)
    }

    fn validate_evaluation(&self, evaluation: &[u8]) -> Result<()> {
        if evaluation.is_empty() {
            return Err(ErgError::InvalidEvaluation(
                "evaluation must contain at least one score".to_string(),
            ));
        }
        let (min, max) = (self.feedback.min_score, self.feedback.max_score);
        if let Some(bad) = evaluation.iter().find(|s| !(min..=max).contains(*s)) {
            return Err(ErgError::InvalidEvaluation(format!(
                "score {} outside {}..={}",
                bad, min, max
            )));
        }
        Ok(())
    }

    async fn lock_for(&self, context: &ContextKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(*context).or_default())
    }

    fn spawn_training(
        &self,
        context: ContextKey,
        catalog: Arc<Catalog>,
        lock: Arc<Mutex<()>>,
    ) -> JoinHandle<Result<TrainOutcome>> {
        let trainer = self.trainer.clone();
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            let result = trainer.train(&context, &catalog).await;
            if let Err(e) = &result {
                warn!("Background training failed for {}: {}", context, e);
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Emotion, EmotionCause};
    use tempfile::TempDir;

    fn ctx() -> ContextKey {
        ContextKey::new(1, 1, Emotion::Angry, EmotionCause::Retail)
    }

    async fn engine(dir: &TempDir, ergs: &[&str]) -> ErgEngine {
        let mut catalogs = StaticCatalogProvider::new();
        catalogs
            .insert_exact(ctx(), Catalog::new(ergs.iter().copied()).unwrap())
            .unwrap();
        let db_path = dir.path().join("engine.db");
        let store = Arc::new(
            LibsqlErgStore::open(db_path.to_str().unwrap())
                .await
                .unwrap(),
        );
        let mut config = ErgConfig::default();
        config.training.min_rows_per_erg = 2;
        config.training.forest.n_trees = 5;
        ErgEngine::new(Arc::new(catalogs), store.clone(), store, &config)
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_scores() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &["a", "b"]).await;

        for bad in [&[][..], &[0, 3][..], &[3, 6][..]] {
            assert!(matches!(
                engine.ingest_feedback(&ctx(), "a", bad).await,
                Err(ErgError::InvalidEvaluation(_))
            ));
        }
        assert_eq!(engine.readiness(&ctx()).await.unwrap().readiness.total_rows(), 0);
    }

    #[tokio::test]
    async fn test_training_failure_still_reports_stored_row() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &["a", "b"]).await;
        engine.ingest_feedback(&ctx(), "a", &[2]).await.unwrap();

        // Both flags set: the next load fails
        let db = libsql::Builder::new_local(dir.path().join("engine.db").to_str().unwrap())
            .build()
            .await
            .unwrap();
        db.connect()
            .unwrap()
            .execute(
                "INSERT INTO erg_data_points (context_key, row_values, recorded_at) VALUES (?, ?, 0)",
                libsql::params![crate::storage::storage_key(&ctx()), "[1,1,2]"],
            )
            .await
            .unwrap();

        let outcome = engine.ingest_feedback(&ctx(), "b", &[4]).await.unwrap();
        assert_eq!(outcome.rows, 3);
        assert!(matches!(
            outcome.training,
            TrainingStatus::Failed(ErgError::DataCorruption { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_context() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &["a", "b"]).await;
        let other = ContextKey::new(9, 9, Emotion::Sad, EmotionCause::NotRetail);

        assert!(matches!(
            engine.recommend(&other).await,
            Err(ErgError::UnknownContext(_))
        ));
        assert!(matches!(
            engine.ingest_feedback(&other, "a", &[3]).await,
            Err(ErgError::UnknownContext(_))
        ));
    }

    #[tokio::test]
    async fn test_inline_training_after_threshold() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, &["a", "b"]).await;

        let first = engine.ingest_feedback(&ctx(), "a", &[1]).await.unwrap();
        assert_eq!(first.rows, 1);
        assert!(matches!(first.training, TrainingStatus::NotReady(_)));

        engine.ingest_feedback(&ctx(), "a", &[1]).await.unwrap();
        engine.ingest_feedback(&ctx(), "b", &[5]).await.unwrap();
        let last = engine.ingest_feedback(&ctx(), "b", &[5]).await.unwrap();
        assert_eq!(last.rows, 4);
        assert!(matches!(last.training, TrainingStatus::Trained(_)));

        let status = engine.readiness(&ctx()).await.unwrap();
        assert!(status.has_model);
        assert_eq!(status.model_trained_rows, Some(4));
        assert_eq!(engine.recommend(&ctx()).await.unwrap().ergs, vec!["b", "a"]);
    }
}
