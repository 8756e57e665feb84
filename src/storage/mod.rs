//! Storage layer for ergrank
//!
//! Provides the persistence abstractions for per-context datasets and
//! models, and the libSQL implementation behind them. The mapping from a
//! [`ContextKey`] to its storage location lives here and nowhere else.

pub mod libsql;
pub mod schema;

use crate::error::Result;
use crate::learning::model::ModelEnvelope;
use crate::types::{Catalog, ContextKey, Dataset};
use async_trait::async_trait;

pub use self::libsql::LibsqlErgStore;

/// Storage key for a context, e.g. `3_1_angry_not_retail`
pub fn storage_key(context: &ContextKey) -> String {
    format!(
        "{}_{}_{}_{}",
        context.use_case_id,
        context.use_case_step,
        context.emotion.as_str(),
        context.cause.slug()
    )
}

/// Append-only per-context training rows
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Encode and durably append one row, creating the dataset if absent.
    ///
    /// Returns the number of rows stored for the context afterwards.
    async fn append(
        &self,
        context: &ContextKey,
        catalog: &Catalog,
        erg: &str,
        evaluation: &[u8],
    ) -> Result<usize>;

    /// All rows in insertion order, or `None` if nothing was ever stored
    async fn load(&self, context: &ContextKey) -> Result<Option<Dataset>>;
}

/// Latest model per context, replaced atomically
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save_model(&self, context: &ContextKey, envelope: &ModelEnvelope) -> Result<()>;

    async fn load_model(&self, context: &ContextKey) -> Result<Option<ModelEnvelope>>;
}
