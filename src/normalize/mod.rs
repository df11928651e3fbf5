//! Batch normalization.
//!
//! Raw extractor output is messy: duplicate names with different casing,
//! strengths as strings, junk values. This module turns a batch of
//! [`CandidateTrait`]s into a clean, deduplicated [`NormalizedBatch`] that the
//! reconciler can apply without further validation.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;
use crate::extraction::CandidateTrait;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

// ---------------------------------------------------------------------------
// TraitKey
// ---------------------------------------------------------------------------

/// Canonical identity of a trait, derived from its display name.
///
/// Two display names that differ only in case, whitespace, or punctuation
/// derive the same key and therefore address the same trait record:
/// "Humorous", "humorous", and " HUMOROUS " all derive `humorous`;
/// "Detail-Oriented" derives `detail_oriented`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitKey(String);

impl TraitKey {
    /// Derive the canonical key for a display name.
    ///
    /// Drops non-ASCII, lowercases, collapses non-alphanumeric runs into
    /// single underscores, and strips leading/trailing underscores. Returns
    /// `None` when nothing alphanumeric survives.
    pub fn derive(name: &str) -> Option<Self> {
        let ascii: String = name.chars().filter(|c| c.is_ascii()).collect();
        let lowered = ascii.to_lowercase();
        let replaced = NON_ALNUM.replace_all(&lowered, "_");
        let stripped = replaced.trim_matches('_');
        if stripped.is_empty() {
            None
        } else {
            Some(Self(stripped.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// NormalizedTrait
// ---------------------------------------------------------------------------

/// A validated trait observation, ready for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTrait {
    /// Canonical identity.
    pub key: TraitKey,
    /// Human-facing name, trimmed but otherwise as emitted.
    pub display_name: String,
    /// Trimmed description. May be empty.
    pub description: String,
    /// Finite strength in [0, 1].
    pub strength: f64,
    /// Supporting transcript excerpts from every merged occurrence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_excerpts: Vec<String>,
}

/// Result of normalizing one extractor batch.
///
/// Normalization is total: invalid items land in `rejected` instead of
/// failing the batch, so one junk value from a model never discards the
/// usable observations around it.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Deduplicated traits in first-occurrence order.
    pub traits: Vec<NormalizedTrait>,
    /// Per-item validation failures, preserved for reporting.
    pub rejected: Vec<EngineError>,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Parse a raw strength value into a finite f64.
///
/// Accepts JSON numbers and numeric strings. Anything else, including
/// non-finite parses like "NaN", is an error.
fn parse_strength(name: &str, raw: &Value) -> Result<f64, EngineError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(EngineError::InvalidTraitData {
            name: name.to_string(),
            reason: format!("strength is not a finite number: {raw}"),
        }),
    }
}

/// Clamp a strength into [0, 1], logging when the value was out of range.
fn clamp_strength(name: &str, value: f64) -> f64 {
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        log::debug!("Clamped strength for '{}': {} -> {}", name, value, clamped);
    }
    clamped
}

/// Running aggregate for one key while deduplicating a batch.
struct Accumulated {
    entry: NormalizedTrait,
    strength_sum: f64,
    occurrences: usize,
}

/// Normalize a batch of candidate traits.
///
/// Per item: the name is trimmed and must derive a non-empty [`TraitKey`];
/// the strength must parse to a finite number and is clamped into [0, 1].
/// Items failing either check are collected into
/// [`NormalizedBatch::rejected`].
///
/// Duplicate keys within the batch collapse into a single entry: strengths
/// are averaged, and a later description is appended (separated by "; ")
/// only when it is not already contained in the accumulated one,
/// case-insensitively. First-occurrence order is preserved.
pub fn normalize(candidates: &[CandidateTrait]) -> NormalizedBatch {
    let mut order: Vec<Accumulated> = Vec::new();
    let mut index: HashMap<TraitKey, usize> = HashMap::new();
    let mut rejected: Vec<EngineError> = Vec::new();

    for candidate in candidates {
        let display_name = candidate.name.trim().to_string();
        let key = match TraitKey::derive(&display_name) {
            Some(k) => k,
            None => {
                let err = EngineError::InvalidTraitData {
                    name: candidate.name.clone(),
                    reason: "name is empty after canonicalization".to_string(),
                };
                log::warn!("Dropping candidate trait: {err}");
                rejected.push(err);
                continue;
            }
        };

        let strength = match parse_strength(&display_name, &candidate.strength) {
            Ok(v) => clamp_strength(&display_name, v),
            Err(err) => {
                log::warn!("Dropping candidate trait: {err}");
                rejected.push(err);
                continue;
            }
        };

        let description = candidate.description.trim().to_string();
        let excerpt = candidate
            .source_excerpt
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        match index.get(&key) {
            Some(&i) => {
                let acc = &mut order[i];
                acc.strength_sum += strength;
                acc.occurrences += 1;
                if !description.is_empty()
                    && !acc
                        .entry
                        .description
                        .to_lowercase()
                        .contains(&description.to_lowercase())
                {
                    if acc.entry.description.is_empty() {
                        acc.entry.description = description;
                    } else {
                        acc.entry.description.push_str("; ");
                        acc.entry.description.push_str(&description);
                    }
                }
                if let Some(e) = excerpt {
                    if !acc.entry.source_excerpts.contains(&e) {
                        acc.entry.source_excerpts.push(e);
                    }
                }
            }
            None => {
                index.insert(key.clone(), order.len());
                order.push(Accumulated {
                    entry: NormalizedTrait {
                        key,
                        display_name,
                        description,
                        strength,
                        source_excerpts: excerpt.into_iter().collect(),
                    },
                    strength_sum: strength,
                    occurrences: 1,
                });
            }
        }
    }

    let traits = order
        .into_iter()
        .map(|mut acc| {
            acc.entry.strength = acc.strength_sum / acc.occurrences as f64;
            acc.entry
        })
        .collect();

    NormalizedBatch { traits, rejected }
}
