//! Recommendation command

use super::helpers::open_engine;
use ergrank_core::{ContextKey, ErgConfig};

pub async fn handle(config: &ErgConfig, context: ContextKey, json: bool) -> anyhow::Result<()> {
    let engine = open_engine(config).await?;
    let recommendation = engine.recommend(&context).await?;

    if json {
        let output = serde_json::json!({
            "context": context,
            "strategy": recommendation.strategy.to_string(),
            "ergs": recommendation.ergs,
            "scores": recommendation.scores,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Recommendations for {} ({}):", context, recommendation.strategy);
    for (i, erg) in recommendation.ergs.iter().enumerate() {
        match recommendation.scores.get(i) {
            Some(score) => println!("  {}. {} ({:.2})", i + 1, erg, score),
            None => println!("  {}. {}", i + 1, erg),
        }
    }
    Ok(())
}
