//! Ranking ergs for a context.
//!
//! With a usable model every catalog erg is scored by the mean of its
//! predicted evaluation and the best ones are returned. Without one (never
//! trained, unreadable, or trained against a different catalog) ergs are
//! sampled at random, which keeps feedback flowing for every erg.

use crate::config::{FallbackSampling, RecommendationSettings};
use crate::error::{ErgError, Result};
use crate::learning::model::{ModelArtifact, ScoredErg};
use crate::storage::ModelStore;
use crate::types::{Catalog, ContextKey};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a recommendation was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Model,
    Random,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Model => write!(f, "model"),
            Strategy::Random => write!(f, "random"),
        }
    }
}

/// Ordered erg identifiers, best first
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub ergs: Vec<String>,
    pub strategy: Strategy,
    /// Scores for the returned ergs; empty for random picks
    pub scores: Vec<f64>,
}

#[derive(Clone)]
pub struct Predictor {
    models: Arc<dyn ModelStore>,
    settings: RecommendationSettings,
}

impl Predictor {
    pub fn new(models: Arc<dyn ModelStore>, settings: RecommendationSettings) -> Self {
        Self { models, settings }
    }

    /// Rank the catalog with the context's model, or sample at random.
    ///
    /// Never fails: model problems are logged and answered with the
    /// random fallback.
    pub async fn recommend(&self, context: &ContextKey, catalog: &Catalog) -> Recommendation {
        match self.load_model(context, catalog).await {
            Ok(model) => {
                let ranked = model.rank(catalog);
                debug!(
                    "Ranked {} ergs for {} (top: {:?})",
                    ranked.len(),
                    context,
                    ranked.first().map(|s| s.erg.as_str())
                );
                self.top(ranked)
            }
            Err(ErgError::ModelUnavailable { reason, .. }) => {
                debug!("No usable model for {} ({}), sampling", context, reason);
                self.random(catalog)
            }
            Err(e) => {
                warn!("Model lookup failed for {}: {}, sampling", context, e);
                self.random(catalog)
            }
        }
    }

    /// Load and validate the context's model
    pub async fn load_model(&self, context: &ContextKey, catalog: &Catalog) -> Result<ModelArtifact> {
        let envelope = self
            .models
            .load_model(context)
            .await?
            .ok_or_else(|| ErgError::model_unavailable(context, "not trained yet"))?;

        let model = ModelArtifact::from_envelope(context, &envelope).map_err(|e| {
            warn!("Discarding stored model for {}: {}", context, e);
            e
        })?;

        if !model.matches_catalog(catalog) {
            warn!(
                "Stored model for {} was trained on a different catalog ({} ergs, now {})",
                context,
                model.catalog.len(),
                catalog.len()
            );
            return Err(ErgError::model_unavailable(context, "catalog changed since training"));
        }

        Ok(model)
    }

    fn top(&self, ranked: Vec<ScoredErg>) -> Recommendation {
        let (ergs, scores) = ranked
            .into_iter()
            .take(self.settings.count)
            .map(|s| (s.erg, s.score))
            .unzip();
        Recommendation {
            ergs,
            strategy: Strategy::Model,
            scores,
        }
    }

    fn random(&self, catalog: &Catalog) -> Recommendation {
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let count = self.settings.count;

        let ergs = match self.settings.sampling {
            FallbackSampling::WithReplacement => (0..count)
                .filter_map(|_| catalog.ergs().choose(&mut rng).cloned())
                .collect(),
            FallbackSampling::WithoutReplacement => catalog
                .ergs()
                .choose_multiple(&mut rng, count)
                .cloned()
                .collect(),
        };

        Recommendation {
            ergs,
            strategy: Strategy::Random,
            scores: Vec::new(),
        }
    }
}
