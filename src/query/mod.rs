//! Read-only projections over profile snapshots.
//!
//! Everything a bot-response layer consults lives here, as methods on
//! [`ProfileSnapshot`]. A snapshot is an immutable point-in-time view, so
//! these projections never block reconciliation and never observe a
//! half-merged batch.

use std::cmp::Ordering;

use crate::normalize::TraitKey;
use crate::profile::record::TraitRecord;
use crate::profile::store::ProfileSnapshot;

impl ProfileSnapshot {
    /// The `k` strongest traits.
    ///
    /// Ordered by strength descending, ties broken by higher observation
    /// count, then lexicographic key. Strengths are never NaN, so this is a
    /// deterministic total order.
    pub fn top_traits(&self, k: usize) -> Vec<&TraitRecord> {
        let mut records: Vec<&TraitRecord> = self.records().collect();
        records.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.observation_count.cmp(&a.observation_count))
                .then_with(|| a.key.cmp(&b.key))
        });
        records.truncate(k);
        records
    }

    /// Whether the trait is present with strength at or above `threshold`.
    /// Unknown keys are simply not above any threshold.
    pub fn exceeds_threshold(&self, key: &TraitKey, threshold: f64) -> bool {
        self.get(key)
            .map(|record| record.strength >= threshold)
            .unwrap_or(false)
    }

    /// Full record for one trait. `None` is the expected answer for a key
    /// never observed, not an error.
    pub fn describe(&self, key: &TraitKey) -> Option<&TraitRecord> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizedTrait;
    use crate::profile::store::{ProfileState, ProfileStore};
    use chrono::{TimeZone, Utc};

    fn snapshot_with(entries: &[(&str, f64, u64)]) -> ProfileSnapshot {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut state = ProfileState::default();
        for (name, strength, observations) in entries {
            let normalized = NormalizedTrait {
                key: TraitKey::derive(name).unwrap(),
                display_name: name.to_string(),
                description: String::new(),
                strength: *strength,
                source_excerpts: Vec::new(),
            };
            let mut record = TraitRecord::from_observation(&normalized, at);
            record.observation_count = *observations;
            state.traits.insert(record.key.clone(), record);
        }
        ProfileStore::with_state("bot-1", state).snapshot()
    }

    #[test]
    fn test_top_traits_orders_by_strength() {
        let snap = snapshot_with(&[("Humorous", 0.68, 2), ("Patient", 0.4, 1), ("Blunt", 0.9, 1)]);
        let top: Vec<&str> = snap
            .top_traits(3)
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(top, vec!["blunt", "humorous", "patient"]);
    }

    #[test]
    fn test_top_traits_truncates() {
        let snap = snapshot_with(&[("Humorous", 0.68, 2), ("Patient", 0.4, 1)]);
        let top = snap.top_traits(1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key.as_str(), "humorous");
    }

    #[test]
    fn test_top_traits_tie_prefers_more_observations() {
        let snap = snapshot_with(&[("Curious", 0.7, 1), ("Blunt", 0.7, 5)]);
        let top: Vec<&str> = snap
            .top_traits(2)
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(top, vec!["blunt", "curious"]);
    }

    #[test]
    fn test_top_traits_full_tie_orders_by_key() {
        let snap = snapshot_with(&[("Curious", 0.7, 2), ("Blunt", 0.7, 2), ("Avid", 0.7, 2)]);
        let top: Vec<&str> = snap
            .top_traits(3)
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(top, vec!["avid", "blunt", "curious"]);
    }

    #[test]
    fn test_top_traits_on_empty_snapshot() {
        let snap = ProfileStore::new("bot-1").snapshot();
        assert!(snap.top_traits(5).is_empty());
    }

    #[test]
    fn test_exceeds_threshold() {
        let snap = snapshot_with(&[("Humorous", 0.68, 2)]);
        let key = TraitKey::derive("humorous").unwrap();
        assert!(snap.exceeds_threshold(&key, 0.5));
        assert!(snap.exceeds_threshold(&key, 0.68));
        assert!(!snap.exceeds_threshold(&key, 0.7));
    }

    #[test]
    fn test_exceeds_threshold_unknown_key() {
        let snap = snapshot_with(&[("Humorous", 0.68, 2)]);
        let key = TraitKey::derive("stoic").unwrap();
        assert!(!snap.exceeds_threshold(&key, 0.0));
    }

    #[test]
    fn test_describe_known_and_unknown() {
        let snap = snapshot_with(&[("Humorous", 0.68, 2)]);
        let known = snap.describe(&TraitKey::derive("Humorous").unwrap());
        assert_eq!(known.unwrap().display_name, "Humorous");

        // Never-observed keys answer None, not a default record.
        assert!(snap.describe(&TraitKey::derive("stoic").unwrap()).is_none());
    }
}
