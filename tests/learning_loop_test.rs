//! Integration tests for the feedback → training → recommendation loop
//!
//! Covers:
//! - Random fallback before any model exists
//! - Training gate and inline retraining
//! - Model ranking, truncation and determinism
//! - Persisted vs in-memory ranking

mod common;

use common::*;
use ergrank_core::{
    DatasetStore, ErgError, ModelTrainer, Predictor, Strategy, TrainOutcome, TrainingGate,
    TrainingStatus,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_recommend_without_model_returns_five_catalog_members() {
    let temp = TempDir::new().unwrap();
    let engine = create_test_engine(&temp, &SIX_ERGS, &test_config()).await;

    let rec = engine.recommend(&context()).await.unwrap();
    assert_eq!(rec.strategy, Strategy::Random);
    assert_eq!(rec.ergs.len(), 5);
    assert!(rec.ergs.iter().all(|e| SIX_ERGS.contains(&e.as_str())));
}

#[tokio::test]
async fn test_recommend_does_not_train() {
    let temp = TempDir::new().unwrap();
    let engine = create_test_engine(&temp, &["A", "B"], &test_config()).await;

    let status = engine.readiness(&context()).await.unwrap();
    assert!(!status.has_model);
    for _ in 0..3 {
        engine.recommend(&context()).await.unwrap();
    }
    assert!(!engine.readiness(&context()).await.unwrap().has_model);
}

#[tokio::test]
async fn test_six_erg_scenario_ranks_best_first() {
    let temp = TempDir::new().unwrap();
    let engine = create_test_engine(&temp, &SIX_ERGS, &test_config()).await;

    feed_rounds(&engine, &context(), &SIX_ERGS[..], "C", 19).await;
    let status = engine.readiness(&context()).await.unwrap();
    assert!(!status.readiness.ready);
    assert!(!status.has_model);

    // Last round: only the final row tips every erg over the threshold
    let mut last = None;
    for erg in SIX_ERGS {
        last = Some(
            engine
                .ingest_feedback(&context(), erg, &biased_evaluation(erg, "C", 19))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert_eq!(last.rows, 120);
    assert!(matches!(last.training, TrainingStatus::Trained(_)));

    let status = engine.readiness(&context()).await.unwrap();
    assert!(status.readiness.ready);
    assert!(status.has_model);

    let rec = engine.recommend(&context()).await.unwrap();
    assert_eq!(rec.strategy, Strategy::Model);
    assert_eq!(rec.ergs.len(), 5);
    assert_eq!(rec.ergs[0], "C");
    assert!(rec.scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_one_erg_short_of_threshold_keeps_random() {
    let temp = TempDir::new().unwrap();
    let engine = create_test_engine(&temp, &["A", "B", "C"], &test_config()).await;

    feed_rounds(&engine, &context(), &["A", "C"], "C", 20).await;
    feed_rounds(&engine, &context(), &["B"], "C", 19).await;

    let status = engine.readiness(&context()).await.unwrap();
    assert!(!status.readiness.ready);
    assert_eq!(status.readiness.lacking(), vec!["B"]);

    assert!(matches!(
        engine.train(&context()).await.unwrap(),
        TrainOutcome::Skipped(_)
    ));
    assert_eq!(
        engine.recommend(&context()).await.unwrap().strategy,
        Strategy::Random
    );
}

#[tokio::test]
async fn test_three_erg_catalog_is_not_padded() {
    let temp = TempDir::new().unwrap();
    let engine = create_test_engine(&temp, &["A", "B", "C"], &test_config()).await;

    feed_rounds(&engine, &context(), &["A", "B", "C"], "B", 20).await;

    let rec = engine.recommend(&context()).await.unwrap();
    assert_eq!(rec.strategy, Strategy::Model);
    assert_eq!(rec.ergs.len(), 3);
    assert_eq!(rec.ergs[0], "B");

    let mut sorted = rec.ergs.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_recommend_is_deterministic_for_fixed_model() {
    let temp = TempDir::new().unwrap();
    let engine = create_test_engine(&temp, &SIX_ERGS, &test_config()).await;
    feed_rounds(&engine, &context(), &SIX_ERGS[..], "E", 20).await;

    let first = engine.recommend(&context()).await.unwrap();
    for _ in 0..5 {
        assert_eq!(engine.recommend(&context()).await.unwrap(), first);
    }
}

#[tokio::test]
async fn test_unknown_erg_leaves_dataset_unchanged() {
    let temp = TempDir::new().unwrap();
    let store = create_test_store(&temp).await;
    let engine = ergrank_core::ErgEngine::new(
        std::sync::Arc::new(catalogs(&SIX_ERGS)),
        store.clone(),
        store.clone(),
        &test_config(),
    );

    engine
        .ingest_feedback(&context(), "A", &[3, 3, 3])
        .await
        .unwrap();
    let before = store.load(&context()).await.unwrap().unwrap();

    let err = engine
        .ingest_feedback(&context(), "Z", &[3, 3, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, ErgError::UnknownErg { .. }));

    let after = store.load(&context()).await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn test_append_then_load_returns_encoded_row() {
    let temp = TempDir::new().unwrap();
    let store = create_test_store(&temp).await;
    let catalog = ergrank_core::Catalog::new(SIX_ERGS).unwrap();

    store
        .append(&context(), &catalog, "D", &[4, 2, 5])
        .await
        .unwrap();
    let dataset = store.load(&context()).await.unwrap().unwrap();
    let last = dataset.rows.last().unwrap();

    assert_eq!(last.erg_flags, vec![0, 0, 0, 1, 0, 0]);
    assert_eq!(last.evaluation, vec![4, 2, 5]);
    assert_eq!(last.to_row(), vec![0, 0, 0, 1, 0, 0, 4, 2, 5]);
}

#[tokio::test]
async fn test_persisted_model_ranks_like_in_memory_model() {
    let temp = TempDir::new().unwrap();
    let store = create_test_store(&temp).await;
    let config = test_config();
    let catalog = ergrank_core::Catalog::new(SIX_ERGS).unwrap();

    for rep in 0..20 {
        for erg in SIX_ERGS {
            store
                .append(&context(), &catalog, erg, &biased_evaluation(erg, "D", rep))
                .await
                .unwrap();
        }
    }

    let trainer = ModelTrainer::new(
        store.clone(),
        store.clone(),
        TrainingGate::new(config.training.min_rows_per_erg),
        config.training.forest.clone(),
        config.training.holdout_fraction,
    );
    let TrainOutcome::Trained { model, report } = trainer.train(&context(), &catalog).await.unwrap()
    else {
        panic!("expected the gate to pass");
    };
    assert_eq!(report.rows, 120);
    assert!(report.holdout_mse.is_some());

    let in_memory: Vec<String> = model
        .rank(&catalog)
        .into_iter()
        .take(config.recommendation.count)
        .map(|s| s.erg)
        .collect();

    let predictor = Predictor::new(store.clone(), config.recommendation.clone());
    let reloaded = predictor.load_model(&context(), &catalog).await.unwrap();
    assert_eq!(reloaded, *model);

    let persisted = predictor.recommend(&context(), &catalog).await;
    assert_eq!(persisted.strategy, Strategy::Model);
    assert_eq!(persisted.ergs, in_memory);
    assert_eq!(persisted.ergs[0], "D");
}
