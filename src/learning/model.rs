//! Versioned model artifact.
//!
//! A persisted model is an envelope of format tag, schema version and a
//! bincode payload. Anything that does not match the current tag and
//! version is reported as unavailable instead of being misread.

use crate::error::{ErgError, Result};
use crate::learning::forest::RandomForest;
use crate::types::{Catalog, ContextKey};
use serde::{Deserialize, Serialize};

/// Format tag written with every model
pub const MODEL_FORMAT: &str = "ergrank-forest";

/// Current payload schema
pub const MODEL_SCHEMA_VERSION: u32 = 1;

/// Raw persisted form of a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEnvelope {
    pub format: String,
    pub schema_version: u32,
    pub payload: Vec<u8>,
    pub trained_rows: usize,
    pub updated_at: i64,
}

/// A fitted model together with what it was trained against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub context: ContextKey,
    pub catalog: Vec<String>,
    pub evaluation_len: usize,
    pub trained_rows: usize,
    pub trained_at: i64,
    /// Mean squared error on held-out rows, when a hold-out was used
    pub holdout_mse: Option<f64>,
    pub forest: RandomForest,
}

/// Predicted quality of one erg
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredErg {
    pub erg: String,
    pub predicted: Vec<f64>,
    /// Mean of `predicted`
    pub score: f64,
}

impl ModelArtifact {
    pub fn to_envelope(&self) -> Result<ModelEnvelope> {
        Ok(ModelEnvelope {
            format: MODEL_FORMAT.to_string(),
            schema_version: MODEL_SCHEMA_VERSION,
            payload: bincode::serialize(self)?,
            trained_rows: self.trained_rows,
            updated_at: self.trained_at,
        })
    }

    pub fn from_envelope(context: &ContextKey, envelope: &ModelEnvelope) -> Result<Self> {
        if envelope.format != MODEL_FORMAT {
            return Err(ErgError::model_unavailable(
                context,
                format!("unknown model format '{}'", envelope.format),
            ));
        }
        if envelope.schema_version != MODEL_SCHEMA_VERSION {
            return Err(ErgError::model_unavailable(
                context,
                format!(
                    "unsupported schema version {} (expected {})",
                    envelope.schema_version, MODEL_SCHEMA_VERSION
                ),
            ));
        }

        let artifact: ModelArtifact = bincode::deserialize(&envelope.payload).map_err(|e| {
            ErgError::model_unavailable(context, format!("undecodable payload: {}", e))
        })?;

        if artifact.context != *context {
            return Err(ErgError::model_unavailable(
                context,
                format!("artifact belongs to {}", artifact.context),
            ));
        }

        let forest = &artifact.forest;
        if forest.n_features() != artifact.catalog.len() {
            return Err(ErgError::model_unavailable(
                context,
                format!(
                    "forest expects {} features for {} ergs",
                    forest.n_features(),
                    artifact.catalog.len()
                ),
            ));
        }
        if forest.n_outputs() != artifact.evaluation_len {
            return Err(ErgError::model_unavailable(
                context,
                format!(
                    "forest predicts {} scores, evaluations have {}",
                    forest.n_outputs(),
                    artifact.evaluation_len
                ),
            ));
        }
        forest
            .validate()
            .map_err(|e| ErgError::model_unavailable(context, format!("malformed forest: {}", e)))?;

        Ok(artifact)
    }

    /// Whether the model was trained against exactly this catalog
    pub fn matches_catalog(&self, catalog: &Catalog) -> bool {
        self.catalog.as_slice() == catalog.ergs()
    }

    /// Score every catalog erg and rank them, best first.
    ///
    /// The sort is stable, so equal scores keep catalog order.
    pub fn rank(&self, catalog: &Catalog) -> Vec<ScoredErg> {
        let mut scored: Vec<ScoredErg> = catalog
            .ergs()
            .iter()
            .enumerate()
            .map(|(i, erg)| {
                let features: Vec<f64> = catalog.one_hot(i).into_iter().map(f64::from).collect();
                let predicted = self.forest.predict(&features);
                let score = if predicted.is_empty() {
                    0.0
                } else {
                    predicted.iter().sum::<f64>() / predicted.len() as f64
                };
                ScoredErg {
                    erg: erg.clone(),
                    predicted,
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }
}
