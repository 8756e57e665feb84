//! Context status command

use super::helpers::open_engine;
use chrono::{TimeZone, Utc};
use ergrank_core::{ContextKey, ErgConfig};

pub async fn handle(config: &ErgConfig, context: ContextKey) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let status = engine.readiness(&context).await?;
    let readiness = &status.readiness;

    println!("Context: {}", context);
    println!("Rows:    {}", readiness.total_rows());
    println!(
        "Gate:    {} (threshold {} per erg)",
        if readiness.ready { "ready" } else { "not ready" },
        readiness.threshold
    );
    for (erg, count) in &readiness.counts {
        let marker = if *count >= readiness.threshold { "✓" } else { " " };
        println!("  {} {:<32} {}", marker, erg, count);
    }

    match (status.model_trained_rows, status.model_trained_at) {
        (Some(rows), Some(at)) => {
            let when = Utc
                .timestamp_opt(at, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| at.to_string());
            println!("Model:   trained on {} rows at {}", rows, when);
        }
        _ => println!("Model:   none (recommendations are random)"),
    }
    Ok(())
}
