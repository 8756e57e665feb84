//! Manual training command

use super::helpers::open_engine;
use ergrank_core::{ContextKey, ErgConfig, TrainOutcome};

pub async fn handle(config: &ErgConfig, context: ContextKey) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;

    match engine.train(&context).await? {
        TrainOutcome::Trained { report, model } => {
            println!("✓ Trained model for {} on {} rows", context, report.rows);
            println!(
                "  Forest: {} trees, seed {}",
                model.forest.trees().len(),
                model.forest.params().seed
            );
            if let Some(mse) = report.holdout_mse {
                println!("  Hold-out MSE: {:.4} ({} rows)", mse, report.holdout_rows);
            }
        }
        TrainOutcome::Skipped(readiness) => {
            println!(
                "Not enough data for {} (need {} rows per erg)",
                context, readiness.threshold
            );
            for erg in readiness.lacking() {
                println!("  lacking: {}", erg);
            }
        }
    }
    Ok(())
}
