//! Common test utilities and helpers

#![allow(dead_code)]

use ergrank_core::{
    Catalog, ContextKey, Emotion, EmotionCause, ErgConfig, ErgEngine, LibsqlErgStore,
    StaticCatalogProvider,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const SIX_ERGS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

pub fn context() -> ContextKey {
    ContextKey::new(1, 1, Emotion::Angry, EmotionCause::Retail)
}

pub fn other_context() -> ContextKey {
    ContextKey::new(2, 3, Emotion::Anxious, EmotionCause::NotRetail)
}

/// Open a store in a temporary directory
pub async fn create_test_store(dir: &TempDir) -> Arc<LibsqlErgStore> {
    let db_path = dir.path().join("ergrank_test.db");
    Arc::new(
        LibsqlErgStore::open(db_path.to_str().unwrap())
            .await
            .expect("Failed to create test store"),
    )
}

/// Configuration tuned for fast, repeatable tests
pub fn test_config() -> ErgConfig {
    let mut config = ErgConfig::default();
    config.training.forest.n_trees = 20;
    config.training.forest.seed = 7;
    config.recommendation.seed = Some(42);
    config
}

/// Catalog registry with the given ergs for `context()` and `other_context()`
pub fn catalogs(ergs: &[&str]) -> StaticCatalogProvider {
    let mut provider = StaticCatalogProvider::new();
    provider
        .insert_exact(context(), Catalog::new(ergs.iter().copied()).unwrap())
        .unwrap();
    provider
        .insert_exact(other_context(), Catalog::new(ergs.iter().copied()).unwrap())
        .unwrap();
    provider
}

/// Engine over a fresh store in `dir`
pub async fn create_test_engine(dir: &TempDir, ergs: &[&str], config: &ErgConfig) -> ErgEngine {
    let store = create_test_store(dir).await;
    ErgEngine::new(Arc::new(catalogs(ergs)), store.clone(), store, config)
}

/// Evaluation where `best` scores high and every other erg low
pub fn biased_evaluation(erg: &str, best: &str, rep: usize) -> Vec<u8> {
    if erg == best {
        vec![5, 5, 4 + (rep % 2) as u8]
    } else {
        vec![1 + (rep % 3) as u8, 2, 1]
    }
}

/// Feed `per_erg` rounds of feedback for every erg, round-robin
pub async fn feed_rounds(engine: &ErgEngine, ctx: &ContextKey, ergs: &[&str], best: &str, per_erg: usize) {
    for rep in 0..per_erg {
        for erg in ergs {
            engine
                .ingest_feedback(ctx, erg, &biased_evaluation(erg, best, rep))
                .await
                .expect("Failed to ingest feedback");
        }
    }
}
