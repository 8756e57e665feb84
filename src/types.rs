//! Core data types for the ergrank recommendation system
//!
//! Defines the context key that partitions all persisted state, the erg
//! catalog, and the encoded training rows (one-hot erg segment followed by
//! the evaluation segment).

use crate::error::{ErgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Detected user emotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Happy,
    Angry,
    Anxious,
    Embarrassed,
    Relaxed,
    Sad,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Angry,
        Emotion::Anxious,
        Emotion::Embarrassed,
        Emotion::Relaxed,
        Emotion::Sad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Angry => "angry",
            Emotion::Anxious => "anxious",
            Emotion::Embarrassed => "embarrassed",
            Emotion::Relaxed => "relaxed",
            Emotion::Sad => "sad",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = ErgError;

    fn from_str(s: &str) -> Result<Self> {
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ErgError::InvalidContextValue {
                field: "emotion",
                value: s.to_string(),
            })
    }
}

/// What the emotion was caused by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionCause {
    #[serde(rename = "retail")]
    Retail,
    #[serde(rename = "not retail", alias = "not_retail", alias = "not-retail")]
    NotRetail,
}

impl EmotionCause {
    /// Human-readable label, as reported by callers
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionCause::Retail => "retail",
            EmotionCause::NotRetail => "not retail",
        }
    }

    /// Whitespace-free form used in storage keys
    pub fn slug(&self) -> &'static str {
        match self {
            EmotionCause::Retail => "retail",
            EmotionCause::NotRetail => "not_retail",
        }
    }
}

impl std::fmt::Display for EmotionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmotionCause {
    type Err = ErgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "retail" => Ok(EmotionCause::Retail),
            "not retail" | "not_retail" | "not-retail" => Ok(EmotionCause::NotRetail),
            _ => Err(ErgError::InvalidContextValue {
                field: "emotion cause",
                value: s.to_string(),
            }),
        }
    }
}

/// Situational context that partitions datasets and models
///
/// Every persisted row and model belongs to exactly one context; nothing is
/// shared or read across contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub use_case_id: u32,
    pub use_case_step: u32,
    pub emotion: Emotion,
    pub cause: EmotionCause,
}

impl ContextKey {
    pub fn new(use_case_id: u32, use_case_step: u32, emotion: Emotion, cause: EmotionCause) -> Self {
        Self {
            use_case_id,
            use_case_step,
            emotion,
            cause,
        }
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "use_case={} step={} emotion={} cause={}",
            self.use_case_id, self.use_case_step, self.emotion, self.cause
        )
    }
}

/// Ordered, immutable list of ergs valid for a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Catalog {
    ergs: Vec<String>,
}

impl Catalog {
    /// Build a catalog, rejecting empty lists and duplicate identifiers
    pub fn new<I, S>(ergs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ergs: Vec<String> = ergs.into_iter().map(Into::into).collect();
        if ergs.is_empty() {
            return Err(ErgError::InvalidCatalog(
                "catalog must contain at least one erg".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(ergs.len());
        for erg in &ergs {
            if !seen.insert(erg.as_str()) {
                return Err(ErgError::InvalidCatalog(format!(
                    "duplicate erg '{}'",
                    erg
                )));
            }
        }

        Ok(Self { ergs })
    }

    pub fn len(&self) -> usize {
        self.ergs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ergs.is_empty()
    }

    pub fn ergs(&self) -> &[String] {
        &self.ergs
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.ergs.get(index).map(String::as_str)
    }

    pub fn position(&self, erg: &str) -> Option<usize> {
        self.ergs.iter().position(|e| e == erg)
    }

    /// Indicator vector selecting the erg at `index`
    pub fn one_hot(&self, index: usize) -> Vec<u8> {
        let mut flags = vec![0; self.ergs.len()];
        if let Some(flag) = flags.get_mut(index) {
            *flag = 1;
        }
        flags
    }
}

impl TryFrom<Vec<String>> for Catalog {
    type Error = ErgError;

    fn try_from(ergs: Vec<String>) -> Result<Self> {
        Catalog::new(ergs)
    }
}

impl From<Catalog> for Vec<String> {
    fn from(catalog: Catalog) -> Self {
        catalog.ergs
    }
}

/// One training row: which erg was shown and how it was evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// One-hot erg segment, exactly one entry is 1
    pub erg_flags: Vec<u8>,
    /// Ordinal survey scores
    pub evaluation: Vec<u8>,
}

impl DataPoint {
    /// Encode a feedback event against a catalog
    pub fn encode(
        context: &ContextKey,
        catalog: &Catalog,
        erg: &str,
        evaluation: &[u8],
    ) -> Result<Self> {
        let index = catalog.position(erg).ok_or_else(|| ErgError::UnknownErg {
            context: context.to_string(),
            erg: erg.to_string(),
        })?;

        Ok(Self {
            erg_flags: catalog.one_hot(index),
            evaluation: evaluation.to_vec(),
        })
    }

    /// Parse a persisted row, validating the erg segment
    pub fn decode(
        context: &ContextKey,
        values: &[i64],
        erg_width: usize,
        evaluation_len: usize,
    ) -> Result<Self> {
        if values.len() != erg_width + evaluation_len {
            return Err(ErgError::corruption(
                context,
                format!(
                    "row has width {}, expected {} ({} ergs + {} scores)",
                    values.len(),
                    erg_width + evaluation_len,
                    erg_width,
                    evaluation_len
                ),
            ));
        }

        let (flags, scores) = values.split_at(erg_width);
        if flags.iter().any(|&f| f != 0 && f != 1) {
            return Err(ErgError::corruption(context, "erg segment is not 0/1"));
        }
        let ones = flags.iter().filter(|&&f| f == 1).count();
        if ones != 1 {
            return Err(ErgError::corruption(
                context,
                format!("erg segment has {} entries set, expected exactly 1", ones),
            ));
        }

        let evaluation = scores
            .iter()
            .map(|&s| {
                u8::try_from(s).map_err(|_| {
                    ErgError::corruption(context, format!("score {} out of range", s))
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Self {
            erg_flags: flags.iter().map(|&f| f as u8).collect(),
            evaluation,
        })
    }

    /// Flattened row: erg flags followed by evaluation scores
    pub fn to_row(&self) -> Vec<i64> {
        self.erg_flags
            .iter()
            .chain(self.evaluation.iter())
            .map(|&v| v as i64)
            .collect()
    }

    /// Index of the erg that was shown
    pub fn erg_index(&self) -> Option<usize> {
        self.erg_flags.iter().position(|&f| f == 1)
    }
}

/// All rows stored for one context, in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub context: ContextKey,
    /// Catalog the rows were written against, in column order
    pub ergs: Vec<String>,
    pub erg_width: usize,
    pub evaluation_len: usize,
    pub rows: Vec<DataPoint>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail if the stored rows were written against another catalog.
    /// Same-width catalogs must also list the same ergs in the same order,
    /// otherwise the one-hot columns would point at different ergs.
    pub fn ensure_catalog(&self, catalog: &Catalog) -> Result<()> {
        if self.erg_width != catalog.len() {
            return Err(ErgError::corruption(
                self.context,
                format!(
                    "dataset was written with {} ergs but the catalog now has {}",
                    self.erg_width,
                    catalog.len()
                ),
            ));
        }
        if self.ergs.as_slice() != catalog.ergs() {
            return Err(ErgError::corruption(
                self.context,
                format!(
                    "dataset was written for ergs {:?} but the catalog now lists {:?}",
                    self.ergs,
                    catalog.ergs()
                ),
            ));
        }
        Ok(())
    }

    /// Number of rows per erg position
    pub fn erg_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.erg_width];
        for row in &self.rows {
            if let Some(i) = row.erg_index() {
                counts[i] += 1;
            }
        }
        counts
    }

    /// Split rows into (one-hot features, evaluation targets)
    pub fn training_matrix(&self) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        self.rows
            .iter()
            .map(|row| {
                (
                    row.erg_flags.iter().map(|&f| f as f64).collect(),
                    row.evaluation.iter().map(|&s| s as f64).collect(),
                )
            })
            .unzip()
    }
}
