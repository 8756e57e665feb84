//! Database initialization command

use anyhow::Context;
use ergrank_core::{ErgConfig, LibsqlErgStore, StaticCatalogProvider};
use tracing::{debug, warn};

/// Handle database initialization command
pub async fn handle(config: &ErgConfig) -> anyhow::Result<()> {
    debug!("Initializing database...");

    let db_path = config.storage.resolve_db_path();
    let store = LibsqlErgStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", db_path))?;
    println!("✓ Database initialized: {}", store.db_path());

    // The catalog is optional at init time but worth checking early
    match StaticCatalogProvider::from_file(&config.catalog.path) {
        Ok(catalogs) => println!(
            "✓ Catalog {:?}: {} entries",
            config.catalog.path,
            catalogs.len()
        ),
        Err(e) => warn!("Catalog {:?} not usable yet: {}", config.catalog.path, e),
    }

    Ok(())
}
