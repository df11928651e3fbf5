//! Batch fingerprinting for duplicate detection.
//!
//! A fingerprint is content-addressed: it covers the normalized traits and
//! the batch observation time, so a retried submission (same content, same
//! timestamp) hashes identically and can be skipped, while the same traits
//! observed at a later time hash differently and reinforce the profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::normalize::NormalizedTrait;

/// Hex-encoded SHA-256 over a normalized batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchFingerprint(String);

impl BatchFingerprint {
    /// Compute the fingerprint of a normalized batch.
    ///
    /// Traits are serialized as JSON tuples and sorted by key before
    /// hashing, so the fingerprint is independent of extractor emission
    /// order.
    pub fn compute(traits: &[NormalizedTrait], observed_at: DateTime<Utc>) -> Self {
        let mut lines: Vec<(String, String)> = traits
            .iter()
            .map(|t| {
                let line = serde_json::json!([
                    t.key.as_str(),
                    t.display_name,
                    t.description,
                    t.strength,
                ])
                .to_string();
                (t.key.as_str().to_string(), line)
            })
            .collect();
        lines.sort_by(|a, b| a.0.cmp(&b.0));

        let mut source: Vec<String> = lines.into_iter().map(|(_, line)| line).collect();
        source.push(observed_at.to_rfc3339());
        let combined = source.join("|");

        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
