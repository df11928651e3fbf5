//! Trait extraction capability boundary.
//!
//! Everything upstream of the engine (LLM calls, prompt templates, response
//! parsing) sits behind [`TraitExtractor`]. The engine consumes
//! [`CandidateTrait`] batches and never sees provider details, so extractors
//! can be swapped without touching reconciliation.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;

// ---------------------------------------------------------------------------
// CandidateTrait
// ---------------------------------------------------------------------------

/// A single trait observation as produced by an extractor, before any
/// validation or canonicalization.
///
/// This is the untrusted shape at the boundary: `strength` is kept as raw
/// JSON because extractors backed by language models emit numbers, numeric
/// strings, and occasionally junk ("N/A", null). Normalization decides what
/// survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTrait {
    /// Display name as emitted, e.g. "Humorous". Accepts the `trait` field
    /// name some extractors use.
    #[serde(alias = "trait")]
    pub name: String,

    /// Free-text description of the observed behavior.
    #[serde(default)]
    pub description: String,

    /// Raw strength value. Expected to be a number in [0, 1] but not
    /// trusted to be one.
    #[serde(default)]
    pub strength: Value,

    /// Optional excerpt of the transcript that evidenced the trait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_excerpt: Option<String>,
}

impl CandidateTrait {
    /// Build a candidate with a numeric strength.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        strength: f64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            strength: serde_json::json!(strength),
            source_excerpt: None,
        }
    }

    /// Attach a supporting transcript excerpt.
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.source_excerpt = Some(excerpt.into());
        self
    }
}

// ---------------------------------------------------------------------------
// TraitExtractor trait
// ---------------------------------------------------------------------------

/// Capability trait for turning a conversation transcript into candidate
/// trait observations.
///
/// Implementations must be safe to share across tasks. A failed extraction
/// should be reported as [`EngineError::ExtractionUnavailable`]; callers
/// treat that as "no observations this round" rather than a fatal error.
#[async_trait]
pub trait TraitExtractor: Send + Sync + fmt::Debug {
    /// Short identifier for the extraction backend, used in logs.
    fn source(&self) -> &str;

    /// Extract candidate traits from a raw conversation transcript.
    ///
    /// An empty vector is a valid result: it means the transcript showed
    /// nothing noteworthy, not that extraction failed.
    async fn extract_traits(&self, transcript: &str) -> Result<Vec<CandidateTrait>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_trait_new() {
        let c = CandidateTrait::new("Humorous", "Uses jokes and witty remarks frequently", 0.8);
        assert_eq!(c.name, "Humorous");
        assert_eq!(c.strength, serde_json::json!(0.8));
        assert!(c.source_excerpt.is_none());
    }

    #[test]
    fn test_candidate_trait_with_excerpt() {
        let c = CandidateTrait::new("Helpful", "Provides detailed assistance", 0.9)
            .with_excerpt("sure, here is a step by step guide");
        assert_eq!(
            c.source_excerpt.as_deref(),
            Some("sure, here is a step by step guide")
        );
    }

    #[test]
    fn test_deserializes_untrusted_shapes() {
        // Numeric-string strength and extra fields must parse; validation
        // happens later.
        let raw = r#"{"id": "1", "name": "Curious", "description": "Asks questions", "strength": "0.7"}"#;
        let c: CandidateTrait = serde_json::from_str(raw).unwrap();
        assert_eq!(c.name, "Curious");
        assert_eq!(c.strength, serde_json::json!("0.7"));
    }

    #[test]
    fn test_deserializes_trait_field_alias() {
        let raw = r#"{"id": "1", "trait": "Humorous", "description": "Uses jokes", "strength": 0.8}"#;
        let c: CandidateTrait = serde_json::from_str(raw).unwrap();
        assert_eq!(c.name, "Humorous");
    }

    #[test]
    fn test_deserializes_missing_fields() {
        let raw = r#"{"name": "Terse"}"#;
        let c: CandidateTrait = serde_json::from_str(raw).unwrap();
        assert_eq!(c.description, "");
        assert!(c.strength.is_null());
    }
}
