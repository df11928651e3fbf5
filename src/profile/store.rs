//! Published profile state and the single-writer apply gate.
//!
//! Each profile keeps its trait map behind two layers:
//!
//! - `published`: an `RwLock<Arc<ProfileState>>` holding the last committed
//!   state. Readers clone the `Arc` and get a consistent snapshot without
//!   ever waiting on a writer.
//! - `write_gate`: a `tokio::sync::Mutex` serializing batch applications.
//!   A writer builds the next state off to the side and commits it with one
//!   pointer swap, so no caller can observe a half-applied batch.
//!
//! Abandoning a write before `publish` leaves the profile untouched; there
//! is no partial state to roll back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::LockMode;
use crate::errors::EngineError;
use crate::normalize::TraitKey;
use crate::profile::record::TraitRecord;
use crate::reconcile::fingerprint::BatchFingerprint;

// ---------------------------------------------------------------------------
// ProfileState
// ---------------------------------------------------------------------------

/// One immutable version of a profile's trait map.
///
/// Ordered by key so serialized snapshots are stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileState {
    /// All retained trait records, keyed by canonical identity.
    pub traits: BTreeMap<TraitKey, TraitRecord>,

    /// Fingerprint of the most recently applied batch, for duplicate
    /// detection across retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fingerprint: Option<BatchFingerprint>,

    /// Monotonic publish counter. Starts at 0 for an empty profile and
    /// increments on every commit.
    #[serde(default)]
    pub version: u64,
}

impl ProfileState {
    pub fn trait_count(&self) -> usize {
        self.traits.len()
    }
}

// ---------------------------------------------------------------------------
// ProfileSnapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of one profile.
///
/// Cheap to take and to clone; holds an `Arc` to the committed state, so it
/// stays internally consistent no matter what writers do afterwards.
/// Query projections over snapshots live in [`crate::query`].
#[derive(Debug, Clone)]
pub struct ProfileSnapshot {
    profile_id: String,
    taken_at: DateTime<Utc>,
    state: Arc<ProfileState>,
}

impl ProfileSnapshot {
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn len(&self) -> usize {
        self.state.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.traits.is_empty()
    }

    /// Look up one trait record by canonical key.
    pub fn get(&self, key: &TraitKey) -> Option<&TraitRecord> {
        self.state.traits.get(key)
    }

    /// All records in key order.
    pub fn records(&self) -> impl Iterator<Item = &TraitRecord> {
        self.state.traits.values()
    }

    pub fn last_fingerprint(&self) -> Option<&BatchFingerprint> {
        self.state.last_fingerprint.as_ref()
    }
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

/// Concurrency-safe holder of one profile's published state.
#[derive(Debug)]
pub struct ProfileStore {
    profile_id: String,
    published: RwLock<Arc<ProfileState>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl ProfileStore {
    /// Create an empty profile.
    pub fn new(profile_id: impl Into<String>) -> Self {
        Self::with_state(profile_id, ProfileState::default())
    }

    /// Create a profile seeded from previously persisted state.
    pub fn with_state(profile_id: impl Into<String>, state: ProfileState) -> Self {
        Self {
            profile_id: profile_id.into(),
            published: RwLock::new(Arc::new(state)),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Take a consistent point-in-time snapshot. Never blocks on writers.
    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            profile_id: self.profile_id.clone(),
            taken_at: Utc::now(),
            state: self.published.read().clone(),
        }
    }

    /// Acquire the exclusive apply gate.
    ///
    /// In [`LockMode::Queue`] the caller waits behind any in-flight
    /// application, bounded by `budget`; exceeding it yields
    /// [`EngineError::ReconciliationTimeout`]. In [`LockMode::FailFast`] a
    /// held gate yields [`EngineError::ProfileLocked`] immediately.
    ///
    /// Dropping the returned guard without publishing abandons the write
    /// and leaves the published state untouched.
    pub async fn lock_for_apply(
        &self,
        mode: LockMode,
        budget: Duration,
    ) -> Result<ApplyGuard<'_>, EngineError> {
        let permit = match mode {
            LockMode::Queue => {
                match tokio::time::timeout(budget, self.write_gate.lock()).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(EngineError::ReconciliationTimeout {
                            profile_id: self.profile_id.clone(),
                            waited_ms: budget.as_millis() as u64,
                        })
                    }
                }
            }
            LockMode::FailFast => match self.write_gate.try_lock() {
                Ok(permit) => permit,
                Err(_) => return Err(EngineError::ProfileLocked(self.profile_id.clone())),
            },
        };
        Ok(ApplyGuard {
            store: self,
            _permit: permit,
        })
    }

    /// Reset the profile to empty, including the duplicate-detection
    /// fingerprint. Goes through the apply gate like any other write.
    pub async fn purge(&self, mode: LockMode, budget: Duration) -> Result<(), EngineError> {
        let mut guard = self.lock_for_apply(mode, budget).await?;
        guard.publish(ProfileState::default());
        log::debug!("Purged profile '{}'", self.profile_id);
        Ok(())
    }

    /// Remove a single trait record. Returns whether it existed.
    pub async fn remove_trait(
        &self,
        key: &TraitKey,
        mode: LockMode,
        budget: Duration,
    ) -> Result<bool, EngineError> {
        let mut guard = self.lock_for_apply(mode, budget).await?;
        let mut next = (*guard.current()).clone();
        let existed = next.traits.remove(key).is_some();
        if existed {
            guard.publish(next);
            log::debug!("Removed trait '{}' from profile '{}'", key, self.profile_id);
        }
        Ok(existed)
    }
}

// ---------------------------------------------------------------------------
// ApplyGuard
// ---------------------------------------------------------------------------

/// Exclusive write access to one profile, held for the duration of a batch
/// application.
#[derive(Debug)]
pub struct ApplyGuard<'a> {
    store: &'a ProfileStore,
    _permit: tokio::sync::MutexGuard<'a, ()>,
}

impl ApplyGuard<'_> {
    /// The committed state this write starts from.
    pub fn current(&self) -> Arc<ProfileState> {
        self.store.published.read().clone()
    }

    /// Commit `next` as the new published state.
    ///
    /// The version is assigned here, one past the currently published
    /// version. Readers see either the old state or the new one, never a
    /// mixture.
    pub fn publish(&mut self, mut next: ProfileState) -> Arc<ProfileState> {
        let mut slot = self.store.published.write();
        next.version = slot.version + 1;
        let committed = Arc::new(next);
        *slot = committed.clone();
        log::debug!(
            "Published profile '{}' v{} ({} traits)",
            self.store.profile_id,
            committed.version,
            committed.traits.len()
        );
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizedTrait;

    fn state_with(name: &str, strength: f64) -> ProfileState {
        let normalized = NormalizedTrait {
            key: TraitKey::derive(name).unwrap(),
            display_name: name.to_string(),
            description: String::new(),
            strength,
            source_excerpts: Vec::new(),
        };
        let record = TraitRecord::from_observation(&normalized, Utc::now());
        let mut state = ProfileState::default();
        state.traits.insert(record.key.clone(), record);
        state
    }

    #[tokio::test]
    async fn test_snapshot_isolation() {
        let store = ProfileStore::new("bot-1");
        let before = store.snapshot();
        assert_eq!(before.len(), 0);

        let mut guard = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();
        guard.publish(state_with("Humorous", 0.8));
        drop(guard);

        // The old snapshot is frozen; a new one sees the commit.
        assert_eq!(before.len(), 0);
        let after = store.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(after.version(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_when_gate_held() {
        let store = ProfileStore::new("bot-1");
        let _held = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();

        let err = store
            .lock_for_apply(LockMode::FailFast, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProfileLocked(_)));
    }

    #[tokio::test]
    async fn test_queue_times_out() {
        let store = ProfileStore::new("bot-1");
        let _held = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();

        let err = store
            .lock_for_apply(LockMode::Queue, Duration::from_millis(20))
            .await
            .unwrap_err();
        match err {
            EngineError::ReconciliationTimeout { waited_ms, .. } => assert_eq!(waited_ms, 20),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_queue_proceeds_after_release() {
        let store = Arc::new(ProfileStore::new("bot-1"));
        let mut guard = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();

        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let mut g = store2
                .lock_for_apply(LockMode::Queue, Duration::from_secs(5))
                .await
                .unwrap();
            g.publish(state_with("Patient", 0.6));
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.publish(state_with("Humorous", 0.8));
        drop(guard);

        waiter.await.unwrap();
        // Second writer started from the first commit, so version is 2.
        let snap = store.snapshot();
        assert_eq!(snap.version(), 2);
    }

    #[tokio::test]
    async fn test_readers_do_not_block_on_writer() {
        let store = ProfileStore::new("bot-1");
        let _held = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();
        // Gate held, snapshot still returns immediately.
        let snap = store.snapshot();
        assert_eq!(snap.version(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_write_publishes_nothing() {
        let store = ProfileStore::new("bot-1");
        {
            let guard = store
                .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
                .await
                .unwrap();
            let _ = guard.current();
            // Dropped without publish.
        }
        assert_eq!(store.snapshot().version(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_queued_waiter_leaves_gate_clean() {
        let store = Arc::new(ProfileStore::new("bot-1"));
        let guard = store
            .lock_for_apply(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();

        // Queue a second writer behind the gate, then kill it mid-wait.
        let store2 = store.clone();
        let waiter = tokio::spawn(async move {
            let mut g = store2
                .lock_for_apply(LockMode::Queue, Duration::from_secs(30))
                .await
                .unwrap();
            g.publish(state_with("Patient", 0.6));
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        drop(guard);

        // The dead waiter left nothing behind: no published state, and
        // the gate hands itself to the next writer without delay.
        assert_eq!(store.snapshot().version(), 0);
        let mut g = store
            .lock_for_apply(LockMode::Queue, Duration::from_millis(100))
            .await
            .unwrap();
        g.publish(state_with("Humorous", 0.8));
        drop(g);
        assert_eq!(store.snapshot().version(), 1);
    }

    #[tokio::test]
    async fn test_purge_resets_everything() {
        let store = ProfileStore::with_state("bot-1", state_with("Humorous", 0.8));
        store
            .purge(LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();
        let snap = store.snapshot();
        assert!(snap.is_empty());
        assert!(snap.last_fingerprint().is_none());
    }

    #[tokio::test]
    async fn test_remove_trait() {
        let store = ProfileStore::with_state("bot-1", state_with("Humorous", 0.8));
        let key = TraitKey::derive("humorous").unwrap();
        let removed = store
            .remove_trait(&key, LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(removed);
        assert!(store.snapshot().get(&key).is_none());

        let removed_again = store
            .remove_trait(&key, LockMode::Queue, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!removed_again);
    }
}
