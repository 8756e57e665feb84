//! Catalog lookup for recommendation contexts
//!
//! Catalogs are plain data: a TOML registry of erg lists keyed by emotion
//! and cause, optionally narrowed to a specific use case and step.
//!
//! # File Format
//!
//! ```toml
//! [[catalog]]
//! emotion = "angry"
//! cause = "retail"
//! ergs = ["breathing_exercise", "apology_voucher", "callback_offer"]
//!
//! [[catalog]]
//! use_case_id = 3
//! use_case_step = 1
//! emotion = "angry"
//! cause = "retail"
//! ergs = ["escalate_to_human", "apology_voucher"]
//! ```
//!
//! # Lookup
//!
//! 1. Exact match (use case + step + emotion + cause)
//! 2. Emotion + cause

use crate::error::{ErgError, Result};
use crate::types::{Catalog, ContextKey, Emotion, EmotionCause};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Supplies the ordered erg list for a context
pub trait CatalogProvider: Send + Sync {
    /// Fails with `UnknownContext` when no catalog covers the context
    fn catalog(&self, context: &ContextKey) -> Result<Arc<Catalog>>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    use_case_id: Option<u32>,
    use_case_step: Option<u32>,
    emotion: Emotion,
    cause: EmotionCause,
    ergs: Vec<String>,
}

/// Catalog registry backed by static configuration
#[derive(Debug, Default, Clone)]
pub struct StaticCatalogProvider {
    exact: HashMap<ContextKey, Arc<Catalog>>,
    by_emotion: HashMap<(Emotion, EmotionCause), Arc<Catalog>>,
}

impl StaticCatalogProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ErgError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read catalog file {:?}: {}", path, e),
            ))
        })?;

        let provider = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} catalog entries from {:?}",
            provider.len(),
            path
        );
        Ok(provider)
    }

    /// Parse a registry from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| ErgError::InvalidCatalog(format!("Failed to parse catalog file: {}", e)))?;

        let mut provider = Self::new();
        for entry in file.catalog {
            let catalog = Catalog::new(entry.ergs)?;
            match (entry.use_case_id, entry.use_case_step) {
                (Some(id), Some(step)) => {
                    let key = ContextKey::new(id, step, entry.emotion, entry.cause);
                    provider.insert_exact(key, catalog)?;
                }
                (None, None) => provider.insert_for_emotion(entry.emotion, entry.cause, catalog)?,
                _ => {
                    return Err(ErgError::InvalidCatalog(format!(
                        "entry for {} / {} must set both use_case_id and use_case_step or neither",
                        entry.emotion, entry.cause
                    )))
                }
            }
        }

        Ok(provider)
    }

    /// Register a catalog for one exact context
    pub fn insert_exact(&mut self, context: ContextKey, catalog: Catalog) -> Result<()> {
        if self.exact.contains_key(&context) {
            return Err(ErgError::InvalidCatalog(format!(
                "duplicate catalog entry for {}",
                context
            )));
        }
        self.exact.insert(context, Arc::new(catalog));
        Ok(())
    }

    /// Register a catalog for every use case sharing an emotion and cause
    pub fn insert_for_emotion(
        &mut self,
        emotion: Emotion,
        cause: EmotionCause,
        catalog: Catalog,
    ) -> Result<()> {
        if self.by_emotion.contains_key(&(emotion, cause)) {
            return Err(ErgError::InvalidCatalog(format!(
                "duplicate catalog entry for {} / {}",
                emotion, cause
            )));
        }
        self.by_emotion.insert((emotion, cause), Arc::new(catalog));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.by_emotion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CatalogProvider for StaticCatalogProvider {
    fn catalog(&self, context: &ContextKey) -> Result<Arc<Catalog>> {
        if let Some(catalog) = self.exact.get(context) {
            return Ok(Arc::clone(catalog));
        }

        if let Some(catalog) = self.by_emotion.get(&(context.emotion, context.cause)) {
            debug!("Using emotion-level catalog for {}", context);
            return Ok(Arc::clone(catalog));
        }

        Err(ErgError::UnknownContext(context.to_string()))
    }
}
