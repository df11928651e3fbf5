//! Batch reconciliation.
//!
//! The single write path into a profile. One reconciliation takes a
//! normalized batch, merges it against the published state under the
//! profile's write gate, and commits the result as one atomic swap:
//!
//! ```text
//! Vec<NormalizedTrait> + observed_at
//!   → fingerprint                  (skip if identical to last applied)
//!   → lock_for_apply               (queue with budget, or fail fast)
//!   → merge::apply_batch           (off to the side, nothing visible)
//!   → publish                      (single pointer swap)
//! ```
//!
//! A timed-out or abandoned attempt never swapped, so the pre-batch state is
//! intact by construction; there is no partial apply to roll back.

pub mod fingerprint;
mod merge;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{EngineConfig, LockMode};
use crate::errors::EngineError;
use crate::normalize::NormalizedTrait;
use crate::profile::store::ProfileStore;

pub use fingerprint::BatchFingerprint;
pub use merge::MergeStats;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What happened to one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// The batch was merged and published.
    Applied { created: usize, updated: usize },
    /// The batch matched the last applied fingerprint and was skipped.
    DuplicateSkipped,
}

/// Receipt for one reconciliation attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    /// Identifier of this attempt, for log correlation.
    pub batch_id: Uuid,
    /// Content fingerprint of the submitted batch.
    pub fingerprint: BatchFingerprint,
    /// Observation time the batch was submitted with.
    pub observed_at: DateTime<Utc>,
    pub outcome: BatchOutcome,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Applies normalized batches to profile stores under the configured merge
/// and locking rules.
#[derive(Debug, Clone)]
pub struct Reconciler {
    decay_factor: f64,
    history_cap: usize,
    lock_mode: LockMode,
    apply_timeout: Duration,
}

impl Reconciler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            decay_factor: config.decay_factor,
            history_cap: config.history_cap,
            lock_mode: config.lock_mode,
            apply_timeout: config.apply_timeout(),
        }
    }

    /// Reconcile one batch using the configured lock mode.
    pub async fn reconcile(
        &self,
        store: &ProfileStore,
        batch: Vec<NormalizedTrait>,
        observed_at: DateTime<Utc>,
    ) -> Result<ReconcileResult, EngineError> {
        self.reconcile_with(store, batch, observed_at, self.lock_mode)
            .await
    }

    /// Reconcile one batch, letting the caller pick queue-or-fail-fast for
    /// this attempt.
    ///
    /// Fails with [`EngineError::EmptyBatch`] when the batch has no traits;
    /// the store is untouched. Duplicate submissions (identical content and
    /// `observed_at` as the last applied batch) are detected by fingerprint
    /// and skipped without touching the store. The same content at a new
    /// `observed_at` is a genuinely new observation and is applied.
    pub async fn reconcile_with(
        &self,
        store: &ProfileStore,
        batch: Vec<NormalizedTrait>,
        observed_at: DateTime<Utc>,
        mode: LockMode,
    ) -> Result<ReconcileResult, EngineError> {
        if batch.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let batch_id = Uuid::new_v4();
        let fingerprint = BatchFingerprint::compute(&batch, observed_at);
        let mut guard = store.lock_for_apply(mode, self.apply_timeout).await?;

        let current = guard.current();
        if current.last_fingerprint.as_ref() == Some(&fingerprint) {
            log::info!(
                "Batch {} for profile '{}' matches last applied fingerprint, skipping",
                batch_id,
                store.profile_id()
            );
            return Ok(ReconcileResult {
                batch_id,
                fingerprint,
                observed_at,
                outcome: BatchOutcome::DuplicateSkipped,
            });
        }

        let mut next = (*current).clone();
        let stats = merge::apply_batch(
            &mut next,
            &batch,
            observed_at,
            self.decay_factor,
            self.history_cap,
        );
        next.last_fingerprint = Some(fingerprint.clone());
        guard.publish(next);

        log::info!(
            "Batch {} applied to profile '{}': {} created, {} updated",
            batch_id,
            store.profile_id(),
            stats.created,
            stats.updated
        );
        Ok(ReconcileResult {
            batch_id,
            fingerprint,
            observed_at,
            outcome: BatchOutcome::Applied {
                created: stats.created,
                updated: stats.updated,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::TraitKey;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn nt(name: &str, strength: f64) -> NormalizedTrait {
        NormalizedTrait {
            key: TraitKey::derive(name).unwrap(),
            display_name: name.to_string(),
            description: String::new(),
            strength,
            source_excerpts: Vec::new(),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(&EngineConfig::default())
    }

    #[tokio::test]
    async fn test_apply_then_duplicate_skip() {
        let store = ProfileStore::new("bot-1");
        let r = reconciler();

        let first = r
            .reconcile(&store, vec![nt("Humorous", 0.8)], t(0))
            .await
            .unwrap();
        assert_eq!(
            first.outcome,
            BatchOutcome::Applied {
                created: 1,
                updated: 0
            }
        );
        let version_after_first = store.snapshot().version();

        // Same content, same observed_at: detected and skipped.
        let second = r
            .reconcile(&store, vec![nt("Humorous", 0.8)], t(0))
            .await
            .unwrap();
        assert_eq!(second.outcome, BatchOutcome::DuplicateSkipped);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(store.snapshot().version(), version_after_first);
    }

    #[tokio::test]
    async fn test_same_content_new_time_is_applied() {
        let store = ProfileStore::new("bot-1");
        let r = reconciler();

        r.reconcile(&store, vec![nt("Humorous", 0.8)], t(0))
            .await
            .unwrap();
        let later = r
            .reconcile(&store, vec![nt("Humorous", 0.8)], t(5))
            .await
            .unwrap();
        assert!(matches!(later.outcome, BatchOutcome::Applied { .. }));

        let snap = store.snapshot();
        let record = snap.get(&TraitKey::derive("humorous").unwrap()).unwrap();
        assert_eq!(record.observation_count, 2);
    }

    #[tokio::test]
    async fn test_only_last_fingerprint_is_tracked() {
        let store = ProfileStore::new("bot-1");
        let r = reconciler();

        r.reconcile(&store, vec![nt("Humorous", 0.8)], t(0))
            .await
            .unwrap();
        r.reconcile(&store, vec![nt("Patient", 0.6)], t(1))
            .await
            .unwrap();
        // The first batch is no longer the last applied one, so a replay of
        // it counts as a fresh observation.
        let replay = r
            .reconcile(&store, vec![nt("Humorous", 0.8)], t(0))
            .await
            .unwrap();
        assert!(matches!(replay.outcome, BatchOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected_store_untouched() {
        let store = ProfileStore::new("bot-1");
        let err = reconciler()
            .reconcile(&store, Vec::new(), t(0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyBatch));
        assert_eq!(store.snapshot().version(), 0);
    }

    #[tokio::test]
    async fn test_worked_example_decay() {
        let store = ProfileStore::new("bot-1");
        let r = reconciler();

        r.reconcile(&store, vec![nt("Humorous", 0.8)], t(0))
            .await
            .unwrap();
        r.reconcile(&store, vec![nt("humorous", 0.4)], t(1))
            .await
            .unwrap();

        let snap = store.snapshot();
        let record = snap.get(&TraitKey::derive("humorous").unwrap()).unwrap();
        // alpha = 0.3: 0.3 * 0.4 + 0.7 * 0.8 = 0.68
        assert!((record.strength - 0.68).abs() < 1e-12);
        assert_eq!(record.observation_count, 2);
    }

    #[tokio::test]
    async fn test_fail_fast_surfaces_profile_locked() {
        let store = ProfileStore::new("bot-1");
        let r = reconciler();
        let _held = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();

        let err = r
            .reconcile_with(&store, vec![nt("Humorous", 0.8)], t(0), LockMode::FailFast)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProfileLocked(_)));
    }

    #[tokio::test]
    async fn test_concurrent_batches_serialize_to_some_order() {
        let store = Arc::new(ProfileStore::new("bot-1"));
        let r = Arc::new(reconciler());
        let strengths = [0.2_f64, 0.5, 0.9];

        let tasks: Vec<_> = strengths
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let store = store.clone();
                let r = r.clone();
                tokio::spawn(async move {
                    r.reconcile(&store, vec![nt("Focused", s)], t(i as u32))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            assert!(matches!(result.unwrap().outcome, BatchOutcome::Applied { .. }));
        }

        let snap = store.snapshot();
        assert_eq!(snap.version(), 3);
        let record = snap.get(&TraitKey::derive("focused").unwrap()).unwrap();
        assert_eq!(record.observation_count, 3);
        assert_eq!(record.history.len(), 3);

        // The final strength must equal the fold of some serialization order.
        let folds: Vec<f64> = [
            [0.2, 0.5, 0.9],
            [0.2, 0.9, 0.5],
            [0.5, 0.2, 0.9],
            [0.5, 0.9, 0.2],
            [0.9, 0.2, 0.5],
            [0.9, 0.5, 0.2],
        ]
        .iter()
        .map(|order| {
            let mut s = order[0];
            for &x in &order[1..] {
                s = 0.3 * x + 0.7 * s;
            }
            s
        })
        .collect();
        assert!(
            folds.iter().any(|f| (f - record.strength).abs() < 1e-12),
            "strength {} is not a valid serialization of {:?}",
            record.strength,
            strengths
        );
    }

    #[tokio::test]
    async fn test_history_cap_enforced_through_reconcile() {
        let config = EngineConfig {
            history_cap: 3,
            ..EngineConfig::default()
        };
        let store = ProfileStore::new("bot-1");
        let r = Reconciler::new(&config);

        for i in 0..4 {
            r.reconcile(&store, vec![nt("Focused", 0.5)], t(i))
                .await
                .unwrap();
        }

        let snap = store.snapshot();
        let record = snap.get(&TraitKey::derive("focused").unwrap()).unwrap();
        assert_eq!(record.history.len(), 3);
        assert_eq!(record.history.front().unwrap().at, t(1));
    }
}
