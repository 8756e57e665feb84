//! Training readiness policy.
//!
//! A context is trained only once every erg in its catalog has been shown
//! and evaluated at least `min_rows_per_erg` times. Training earlier would
//! favour the ergs that happened to be shown most, not the ones that work.

use crate::error::Result;
use crate::storage::DatasetStore;
use crate::types::{Catalog, ContextKey, Dataset};
use tracing::debug;

/// Per-erg row counts and the resulting decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub threshold: usize,
    /// (erg, rows) in catalog order
    pub counts: Vec<(String, usize)>,
    pub ready: bool,
}

impl Readiness {
    /// Ergs still below the threshold
    pub fn lacking(&self) -> Vec<&str> {
        self.counts
            .iter()
            .filter(|(_, n)| *n < self.threshold)
            .map(|(erg, _)| erg.as_str())
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Clone)]
pub struct TrainingGate {
    threshold: usize,
}

impl Default for TrainingGate {
    fn default() -> Self {
        Self::new(20)
    }
}

impl TrainingGate {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Decide readiness from an already loaded dataset (or its absence)
    pub fn evaluate(&self, dataset: Option<&Dataset>, catalog: &Catalog) -> Readiness {
        let per_position = dataset.map(Dataset::erg_counts).unwrap_or_default();

        let counts: Vec<(String, usize)> = catalog
            .ergs()
            .iter()
            .enumerate()
            .map(|(i, erg)| (erg.clone(), per_position.get(i).copied().unwrap_or(0)))
            .collect();

        let ready = dataset.is_some() && counts.iter().all(|(_, n)| *n >= self.threshold);

        Readiness {
            threshold: self.threshold,
            counts,
            ready,
        }
    }

    /// Load the context's dataset and report per-erg readiness.
    ///
    /// A missing dataset is simply not ready.
    pub async fn readiness(
        &self,
        store: &dyn DatasetStore,
        context: &ContextKey,
        catalog: &Catalog,
    ) -> Result<Readiness> {
        let dataset = store.load(context).await?;
        if let Some(dataset) = &dataset {
            dataset.ensure_catalog(catalog)?;
        }

        let readiness = self.evaluate(dataset.as_ref(), catalog);
        debug!(
            "Training gate for {}: ready={} lacking={:?}",
            context,
            readiness.ready,
            readiness.lacking()
        );
        Ok(readiness)
    }

    pub async fn is_ready(
        &self,
        store: &dyn DatasetStore,
        context: &ContextKey,
        catalog: &Catalog,
    ) -> Result<bool> {
        Ok(self.readiness(store, context, catalog).await?.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataPoint, Emotion, EmotionCause};
    use proptest::prelude::*;

    fn ctx() -> ContextKey {
        ContextKey::new(1, 1, Emotion::Relaxed, EmotionCause::Retail)
    }

    fn dataset_with_counts(catalog: &Catalog, counts: &[usize]) -> Dataset {
        let mut rows = Vec::new();
        for (i, &n) in counts.iter().enumerate() {
            let erg = catalog.get(i).unwrap();
            for _ in 0..n {
                rows.push(DataPoint::encode(&ctx(), catalog, erg, &[3, 3]).unwrap());
            }
        }
        Dataset {
            context: ctx(),
            ergs: catalog.ergs().to_vec(),
            erg_width: catalog.len(),
            evaluation_len: 2,
            rows,
        }
    }

    #[test]
    fn test_missing_dataset_is_not_ready() {
        let catalog = Catalog::new(["a", "b"]).unwrap();
        let readiness = TrainingGate::default().evaluate(None, &catalog);
        assert!(!readiness.ready);
        assert_eq!(readiness.lacking(), vec!["a", "b"]);
        assert_eq!(readiness.total_rows(), 0);
    }

    #[test]
    fn test_one_erg_short_blocks_training() {
        let catalog = Catalog::new(["a", "b", "c"]).unwrap();
        let gate = TrainingGate::new(20);

        let dataset = dataset_with_counts(&catalog, &[20, 19, 25]);
        let readiness = gate.evaluate(Some(&dataset), &catalog);
        assert!(!readiness.ready);
        assert_eq!(readiness.lacking(), vec!["b"]);

        let dataset = dataset_with_counts(&catalog, &[20, 20, 25]);
        assert!(gate.evaluate(Some(&dataset), &catalog).ready);
    }

    proptest! {
        #[test]
        fn prop_ready_iff_every_erg_meets_threshold(
            counts in proptest::collection::vec(0usize..30, 1..6),
            threshold in 1usize..25,
        ) {
            let names: Vec<String> = (0..counts.len()).map(|i| format!("erg{}", i)).collect();
            let catalog = Catalog::new(names).unwrap();
            let dataset = dataset_with_counts(&catalog, &counts);

            let readiness = TrainingGate::new(threshold).evaluate(Some(&dataset), &catalog);
            prop_assert_eq!(readiness.ready, counts.iter().all(|&n| n >= threshold));
        }
    }
}
