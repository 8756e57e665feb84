//! Error types for the ergrank recommendation system
//!
//! This module provides structured error handling using thiserror for
//! error definitions and anyhow for propagation at the binary boundary.

use thiserror::Error;

/// Main error type for ergrank operations
#[derive(Error, Debug)]
pub enum ErgError {
    /// No catalog is defined for the requested context
    #[error("Unknown context: {0}")]
    UnknownContext(String),

    /// The chosen erg is not a member of the context's catalog
    #[error("Unknown erg '{erg}' for context {context}")]
    UnknownErg { context: String, erg: String },

    /// A persisted dataset row is malformed or misaligned with the catalog
    #[error("Data corruption in context {context}: {reason}")]
    DataCorruption { context: String, reason: String },

    /// Model missing or unreadable. Recovered locally, never surfaced by
    /// `recommend`.
    #[error("Model unavailable for context {context}: {reason}")]
    ModelUnavailable { context: String, reason: String },

    /// A context component (emotion, cause) could not be parsed
    #[error("Invalid {field}: '{value}'")]
    InvalidContextValue { field: &'static str, value: String },

    /// Evaluation vector rejected at ingestion
    #[error("Invalid evaluation: {0}")]
    InvalidEvaluation(String),

    /// Catalog definition rejected at load
    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model artifact encoding failed
    #[error("Model codec error: {0}")]
    ModelCodec(#[from] bincode::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl ErgError {
    /// Shorthand for a corruption error tied to a context
    pub fn corruption(context: impl ToString, reason: impl Into<String>) -> Self {
        ErgError::DataCorruption {
            context: context.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an unavailable-model error tied to a context
    pub fn model_unavailable(context: impl ToString, reason: impl Into<String>) -> Self {
        ErgError::ModelUnavailable {
            context: context.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for ergrank operations
pub type Result<T> = std::result::Result<T, ErgError>;

/// Convert libsql::Error to ErgError
impl From<libsql::Error> for ErgError {
    fn from(err: libsql::Error) -> Self {
        ErgError::Database(err.to_string())
    }
}

/// Convert anyhow::Error to ErgError
impl From<anyhow::Error> for ErgError {
    fn from(err: anyhow::Error) -> Self {
        ErgError::Other(err.to_string())
    }
}
