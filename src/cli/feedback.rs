//! Feedback ingestion command

use super::helpers::open_engine;
use ergrank_core::{ContextKey, ErgConfig, TrainOutcome, TrainingStatus};

pub async fn handle(
    config: &ErgConfig,
    context: ContextKey,
    erg: &str,
    evaluation: &[u8],
) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let outcome = engine.ingest_feedback(&context, erg, evaluation).await?;

    println!("✓ Recorded feedback for '{}' ({} rows in {})", erg, outcome.rows, context);
    match outcome.training {
        TrainingStatus::NotReady(readiness) => {
            println!(
                "  Training needs {} rows per erg; still lacking: {}",
                readiness.threshold,
                readiness.lacking().join(", ")
            );
        }
        TrainingStatus::Trained(report) => {
            println!("  Model retrained on {} rows", report.rows);
        }
        TrainingStatus::Failed(e) => {
            println!("  Retraining failed, previous model kept: {}", e);
        }
        TrainingStatus::Scheduled(handle) => {
            // The process exits after this command, so wait for the task
            if let TrainOutcome::Trained { report, .. } = handle.await?? {
                println!("  Model retrained on {} rows", report.rows);
            }
        }
    }
    Ok(())
}
