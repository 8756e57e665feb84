//! Shared helper functions for CLI commands

use anyhow::Context;
use ergrank_core::{ErgConfig, ErgEngine};
use tracing::debug;

/// Build the engine described by the configuration
pub async fn open_engine(config: &ErgConfig) -> anyhow::Result<ErgEngine> {
    debug!("Using database: {}", config.storage.resolve_db_path());
    ErgEngine::from_config(config)
        .await
        .with_context(|| format!("Failed to open engine (catalog {:?})", config.catalog.path))
}
