//! Per-trait persistent state.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::{NormalizedTrait, TraitKey};

/// One historical strength observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub at: DateTime<Utc>,
    pub strength: f64,
}

/// The retained state for one trait of one profile.
///
/// `strength` is the current reconciled value; `history` keeps the most
/// recent observations (post-merge values), oldest first, bounded by the
/// configured cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitRecord {
    pub key: TraitKey,
    pub display_name: String,
    pub description: String,
    pub strength: f64,
    pub observation_count: u64,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    #[serde(default)]
    pub history: VecDeque<HistoryPoint>,
}

impl TraitRecord {
    /// Create a record from a first observation.
    pub fn from_observation(normalized: &NormalizedTrait, at: DateTime<Utc>) -> Self {
        let mut history = VecDeque::new();
        history.push_back(HistoryPoint {
            at,
            strength: normalized.strength,
        });
        Self {
            key: normalized.key.clone(),
            display_name: normalized.display_name.clone(),
            description: normalized.description.clone(),
            strength: normalized.strength,
            observation_count: 1,
            first_observed: at,
            last_observed: at,
            history,
        }
    }

    /// Append a history point, evicting the oldest entries to stay within
    /// `cap`. The cap is enforced on every push, so lowering it between
    /// batches trims existing history too. A cap of zero is treated as
    /// one; the newest point is always retained.
    pub fn push_history(&mut self, at: DateTime<Utc>, strength: f64, cap: usize) {
        let cap = cap.max(1);
        while self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(HistoryPoint { at, strength });
    }
}
