//! Degrading wrapper around a [`TraitExtractor`].
//!
//! The pipeline never fails because the extractor is down: a failed call is
//! logged and reported as an empty candidate list, and the analysis proceeds
//! as a no-observation round. Downstream consumers see a stale profile at
//! worst, never an error page.

use std::sync::Arc;

use crate::extraction::capability::{CandidateTrait, TraitExtractor};

/// What one extraction round produced.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// Candidate traits, possibly empty.
    pub candidates: Vec<CandidateTrait>,
    /// Set when the extractor failed and the round degraded to an empty
    /// batch. Carries the rendered error for reporting.
    pub degraded: Option<String>,
}

/// Wraps any extractor implementation and absorbs its failures.
#[derive(Debug, Clone)]
pub struct ExtractorAdapter {
    inner: Arc<dyn TraitExtractor>,
}

impl ExtractorAdapter {
    pub fn new(inner: Arc<dyn TraitExtractor>) -> Self {
        Self { inner }
    }

    /// Identifier of the wrapped extraction backend.
    pub fn source(&self) -> &str {
        self.inner.source()
    }

    /// Run one extraction round.
    ///
    /// Never returns an error: an unavailable extractor degrades to an empty
    /// candidate list with [`ExtractionOutcome::degraded`] set.
    pub async fn candidates(&self, transcript: &str) -> ExtractionOutcome {
        match self.inner.extract_traits(transcript).await {
            Ok(candidates) => {
                log::debug!(
                    "Extractor '{}' produced {} candidate trait(s)",
                    self.inner.source(),
                    candidates.len()
                );
                ExtractionOutcome {
                    candidates,
                    degraded: None,
                }
            }
            Err(e) => {
                log::warn!(
                    "Extractor '{}' unavailable, continuing with empty batch: {}",
                    self.inner.source(),
                    e
                );
                ExtractionOutcome {
                    candidates: Vec::new(),
                    degraded: Some(e.to_string()),
                }
            }
        }
    }
}
