//! Deterministic extractor implementations.
//!
//! Real deployments plug an LLM-backed extractor in from outside the crate.
//! These two implement the same capability for tests, demos, and offline
//! replay: [`StaticExtractor`] returns a fixed candidate list, and
//! [`FixtureExtractor`] replays a JSON file of captured extractor output.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::EngineError;
use crate::extraction::capability::{CandidateTrait, TraitExtractor};

// ---------------------------------------------------------------------------
// StaticExtractor
// ---------------------------------------------------------------------------

/// Extractor that returns the same candidate list for every transcript.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    traits: Vec<CandidateTrait>,
}

impl StaticExtractor {
    pub fn new(traits: Vec<CandidateTrait>) -> Self {
        Self { traits }
    }

    /// A small two-trait sample set, handy for demos and smoke tests.
    pub fn sample() -> Self {
        Self::new(vec![
            CandidateTrait::new("Humorous", "Uses jokes and witty remarks frequently", 0.8),
            CandidateTrait::new(
                "Helpful",
                "Provides detailed explanations and assistance",
                0.9,
            ),
        ])
    }
}

#[async_trait]
impl TraitExtractor for StaticExtractor {
    fn source(&self) -> &str {
        "static"
    }

    async fn extract_traits(
        &self,
        _transcript: &str,
    ) -> Result<Vec<CandidateTrait>, EngineError> {
        Ok(self.traits.clone())
    }
}

// ---------------------------------------------------------------------------
// FixtureExtractor
// ---------------------------------------------------------------------------

/// Accepted fixture layouts: a bare candidate array, or the wrapped
/// `{"traits": [...]}` shape an analysis endpoint responds with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixtureFile {
    List(Vec<CandidateTrait>),
    Wrapped { traits: Vec<CandidateTrait> },
}

/// Extractor that replays candidate traits from a JSON fixture file.
///
/// The file is read on every call, so a long-running process picks up
/// edits. An unreadable or unparsable file reports
/// [`EngineError::ExtractionUnavailable`], which the adapter degrades to an
/// empty batch.
#[derive(Debug, Clone)]
pub struct FixtureExtractor {
    path: PathBuf,
}

impl FixtureExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TraitExtractor for FixtureExtractor {
    fn source(&self) -> &str {
        "fixture"
    }

    async fn extract_traits(
        &self,
        _transcript: &str,
    ) -> Result<Vec<CandidateTrait>, EngineError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            EngineError::ExtractionUnavailable(format!(
                "fixture '{}' unreadable: {}",
                self.path.display(),
                e
            ))
        })?;
        let parsed: FixtureFile = serde_json::from_str(&raw).map_err(|e| {
            EngineError::ExtractionUnavailable(format!(
                "fixture '{}' is not a candidate trait list: {}",
                self.path.display(),
                e
            ))
        })?;
        let traits = match parsed {
            FixtureFile::List(traits) => traits,
            FixtureFile::Wrapped { traits } => traits,
        };
        log::debug!(
            "Replayed {} candidate trait(s) from '{}'",
            traits.len(),
            self.path.display()
        );
        Ok(traits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_extractor_is_deterministic() {
        let extractor = StaticExtractor::sample();
        let a = extractor.extract_traits("first transcript").await.unwrap();
        let b = extractor.extract_traits("second transcript").await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].name, b[0].name);
        assert_eq!(a[1].name, "Helpful");
    }

    #[tokio::test]
    async fn test_fixture_replays_bare_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traits.json");
        std::fs::write(
            &path,
            r#"[{"name": "Curious", "description": "Asks questions", "strength": 0.7}]"#,
        )
        .unwrap();

        let extractor = FixtureExtractor::new(&path);
        let traits = extractor.extract_traits("ignored").await.unwrap();
        assert_eq!(traits.len(), 1);
        assert_eq!(traits[0].name, "Curious");
    }

    #[tokio::test]
    async fn test_fixture_replays_wrapped_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.json");
        std::fs::write(
            &path,
            r#"{
                "success": true,
                "traits": [
                    {"id": "1", "trait": "Humorous", "description": "Uses jokes and witty remarks frequently", "strength": 0.8},
                    {"id": "2", "trait": "Helpful", "description": "Provides detailed explanations and assistance", "strength": 0.9}
                ]
            }"#,
        )
        .unwrap();

        let extractor = FixtureExtractor::new(&path);
        let traits = extractor.extract_traits("ignored").await.unwrap();
        assert_eq!(traits.len(), 2);
        assert_eq!(traits[0].name, "Humorous");
        assert_eq!(traits[1].name, "Helpful");
    }

    #[tokio::test]
    async fn test_fixture_missing_file_is_unavailable() {
        let extractor = FixtureExtractor::new("/nonexistent/traits.json");
        let err = extractor.extract_traits("ignored").await.unwrap_err();
        assert!(matches!(err, EngineError::ExtractionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fixture_junk_content_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.json");
        std::fs::write(&path, "not json at all").unwrap();

        let extractor = FixtureExtractor::new(&path);
        let err = extractor.extract_traits("ignored").await.unwrap_err();
        assert!(matches!(err, EngineError::ExtractionUnavailable(_)));
    }
}
