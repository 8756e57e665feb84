//! Batch model training per context.
//!
//! The erg one-hot segment of each row is the feature vector and the
//! evaluation segment is the target, so the fitted model answers "how would
//! this erg be evaluated here" for any candidate erg.

use crate::error::{ErgError, Result};
use crate::learning::forest::{ForestParams, RandomForest};
use crate::learning::gate::{Readiness, TrainingGate};
use crate::learning::model::ModelArtifact;
use crate::storage::{DatasetStore, ModelStore};
use crate::types::{Catalog, ContextKey, Dataset};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of a completed training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub rows: usize,
    pub holdout_rows: usize,
    pub holdout_mse: Option<f64>,
    pub trained_at: i64,
}

/// Result of a `train` call
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    /// Not enough balanced data yet; nothing was written
    Skipped(Readiness),
    /// A new model was fitted and persisted
    Trained {
        report: TrainingReport,
        model: Box<ModelArtifact>,
    },
}

impl TrainOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainOutcome::Trained { .. })
    }
}

#[derive(Clone)]
pub struct ModelTrainer {
    datasets: Arc<dyn DatasetStore>,
    models: Arc<dyn ModelStore>,
    gate: TrainingGate,
    params: ForestParams,
    holdout_fraction: f64,
}

impl ModelTrainer {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        models: Arc<dyn ModelStore>,
        gate: TrainingGate,
        params: ForestParams,
        holdout_fraction: f64,
    ) -> Self {
        Self {
            datasets,
            models,
            gate,
            params,
            holdout_fraction,
        }
    }

    pub fn gate(&self) -> &TrainingGate {
        &self.gate
    }

    /// Fit and persist a model if the gate allows it; otherwise a no-op
    pub async fn train(&self, context: &ContextKey, catalog: &Catalog) -> Result<TrainOutcome> {
        let dataset = self.datasets.load(context).await?;
        if let Some(dataset) = &dataset {
            dataset.ensure_catalog(catalog)?;
        }

        let readiness = self.gate.evaluate(dataset.as_ref(), catalog);
        let (Some(dataset), true) = (dataset, readiness.ready) else {
            debug!(
                "Skipping training for {}: {} rows, lacking {:?}",
                context,
                readiness.total_rows(),
                readiness.lacking()
            );
            return Ok(TrainOutcome::Skipped(readiness));
        };

        info!("Training model for {} on {} rows", context, dataset.len());

        let params = self.params.clone();
        let holdout_fraction = self.holdout_fraction;
        let catalog = catalog.clone();
        let (model, report) = tokio::task::spawn_blocking(move || {
            fit_artifact(&dataset, &catalog, &params, holdout_fraction)
        })
        .await
        .map_err(|e| ErgError::Other(format!("Training task failed: {}", e)))??;

        let envelope = model.to_envelope()?;
        self.models.save_model(context, &envelope).await?;

        match report.holdout_mse {
            Some(mse) => info!(
                "Stored model for {} ({} rows, hold-out MSE {:.3} on {} rows)",
                context, report.rows, mse, report.holdout_rows
            ),
            None => info!("Stored model for {} ({} rows)", context, report.rows),
        }

        Ok(TrainOutcome::Trained {
            report,
            model: Box::new(model),
        })
    }
}

/// Fit the forest for a dataset, measuring it on a seeded hold-out first
pub fn fit_artifact(
    dataset: &Dataset,
    catalog: &Catalog,
    params: &ForestParams,
    holdout_fraction: f64,
) -> Result<(ModelArtifact, TrainingReport)> {
    let (x, y) = dataset.training_matrix();
    let n = x.len();

    let n_holdout = (n as f64 * holdout_fraction).floor() as usize;
    let holdout_mse = if n_holdout > 0 && n_holdout < n {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(params.seed));
        let (test_idx, train_idx) = indices.split_at(n_holdout);

        let pick = |rows: &[Vec<f64>], idx: &[usize]| -> Vec<Vec<f64>> {
            idx.iter().map(|&i| rows[i].clone()).collect()
        };
        let holdout_model =
            RandomForest::fit(&pick(&x, train_idx), &pick(&y, train_idx), params)?;
        Some(holdout_model.mean_squared_error(&pick(&x, test_idx), &pick(&y, test_idx)))
    } else {
        None
    };

    let forest = RandomForest::fit(&x, &y, params)?;
    let trained_at = Utc::now().timestamp();

    let model = ModelArtifact {
        context: dataset.context,
        catalog: catalog.ergs().to_vec(),
        evaluation_len: dataset.evaluation_len,
        trained_rows: n,
        trained_at,
        holdout_mse,
        forest,
    };
    let report = TrainingReport {
        rows: n,
        holdout_rows: if holdout_mse.is_some() { n_holdout } else { 0 },
        holdout_mse,
        trained_at,
    };
    Ok((model, report))
}
