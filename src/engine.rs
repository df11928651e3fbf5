//! Pipeline facade.
//!
//! [`PersonalityEngine`] wires the stages together behind one surface:
//!
//! ```text
//! transcript ──ExtractorAdapter──► candidates ──normalize──► batch
//!                                                              │
//!                 ProfileRegistry ◄──Reconciler◄───────────────┘
//!                        │
//!                 ProfileSnapshot ──► query projections (bot runtime)
//! ```
//!
//! Upstream trouble is absorbed here: an unavailable extractor or a batch
//! with nothing usable becomes a plain [`AnalysisReport`], never an error.
//! Only lock contention and timeouts surface, because only the caller knows
//! its retry policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::extraction::{CandidateTrait, ExtractorAdapter, TraitExtractor};
use crate::normalize::{normalize, TraitKey};
use crate::persistence::{JsonProfilePersistence, ProfilePersistence};
use crate::profile::registry::ProfileRegistry;
use crate::profile::store::{ProfileSnapshot, ProfileStore};
use crate::reconcile::{BatchOutcome, Reconciler};
use crate::status;

// ---------------------------------------------------------------------------
// AnalysisReport
// ---------------------------------------------------------------------------

/// How one analysis round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// New observations were merged into the profile.
    Applied { created: usize, updated: usize },
    /// The round duplicated the last applied batch and was skipped.
    DuplicateSkipped,
    /// Extraction and normalization left nothing to merge.
    NoUsableTraits,
}

/// What one analysis round did, in the shape a dashboard renders.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub profile_id: String,
    /// Reconciliation attempt id; absent when nothing reached the profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    pub observed_at: DateTime<Utc>,
    pub outcome: AnalysisOutcome,
    /// Candidates the extractor emitted, before validation.
    pub candidates_seen: usize,
    /// Rendered reasons for every candidate dropped during normalization.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
    /// Set when the extractor was unavailable and the round degraded to an
    /// empty batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor_degraded: Option<String>,
}

// ---------------------------------------------------------------------------
// PersonalityEngine
// ---------------------------------------------------------------------------

/// The personality extraction and trait-consistency engine.
///
/// One engine serves any number of profiles; profiles reconcile
/// independently and in parallel. The engine is `Send + Sync` and meant to
/// be shared behind an `Arc` by a surrounding service.
#[derive(Debug)]
pub struct PersonalityEngine {
    config: EngineConfig,
    extractor: ExtractorAdapter,
    reconciler: Reconciler,
    registry: ProfileRegistry,
    persistence: Option<Box<dyn ProfilePersistence>>,
}

impl PersonalityEngine {
    /// Build an engine from a validated configuration and an extractor
    /// implementation. Marks the process-wide status board started.
    pub fn new(
        config: EngineConfig,
        extractor: Arc<dyn TraitExtractor>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let persistence: Option<Box<dyn ProfilePersistence>> = config
            .persist_dir
            .as_ref()
            .map(|dir| Box::new(JsonProfilePersistence::new(dir)) as Box<dyn ProfilePersistence>);

        let engine = Self {
            reconciler: Reconciler::new(&config),
            extractor: ExtractorAdapter::new(extractor),
            registry: ProfileRegistry::new(),
            persistence,
            config,
        };
        status::mark_started();
        log::info!(
            "Personality engine started (extractor={}, decay_factor={}, history_cap={}, persistence={})",
            engine.extractor.source(),
            engine.config.decay_factor,
            engine.config.history_cap,
            engine
                .config
                .persist_dir
                .as_deref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "disabled".to_string()),
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The store for a profile, created on first access. With persistence
    /// enabled, first access seeds the store from the latest valid snapshot
    /// on disk; anything unusable degrades to empty.
    fn store_for(&self, profile_id: &str) -> Arc<ProfileStore> {
        if let Some(store) = self.registry.get(profile_id) {
            return store;
        }
        let state = self
            .persistence
            .as_ref()
            .map(|p| p.load_or_empty(profile_id))
            .unwrap_or_default();
        self.registry
            .get_or_insert_with(profile_id, || ProfileStore::with_state(profile_id, state))
    }

    /// Best-effort snapshot write. Failure degrades to a logged error; the
    /// in-memory profile stays authoritative.
    fn persist(&self, store: &ProfileStore) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&store.snapshot()) {
                log::error!("Failed to persist profile '{}': {}", store.profile_id(), e);
            }
        }
    }

    // --- Write path ---

    /// Analyze a transcript and merge the derived traits into a profile,
    /// stamping the observation with the current time.
    pub async fn analyze(
        &self,
        profile_id: &str,
        transcript: &str,
    ) -> Result<AnalysisReport, EngineError> {
        self.analyze_at(profile_id, transcript, Utc::now()).await
    }

    /// Analyze a transcript with an explicit observation time. Replays and
    /// tests use this to keep rounds reproducible.
    pub async fn analyze_at(
        &self,
        profile_id: &str,
        transcript: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<AnalysisReport, EngineError> {
        let extraction = self.extractor.candidates(transcript).await;
        let mut report = self
            .ingest(profile_id, &extraction.candidates, observed_at)
            .await?;
        report.extractor_degraded = extraction.degraded;
        Ok(report)
    }

    /// Merge already-extracted candidates into a profile.
    ///
    /// This is the whole write path minus extraction: normalize, reconcile,
    /// persist. Per-candidate problems are absorbed into the report;
    /// [`EngineError::ProfileLocked`] and
    /// [`EngineError::ReconciliationTimeout`] surface to the caller.
    pub async fn ingest(
        &self,
        profile_id: &str,
        candidates: &[CandidateTrait],
        observed_at: DateTime<Utc>,
    ) -> Result<AnalysisReport, EngineError> {
        let batch = normalize(candidates);
        let rejected: Vec<String> = batch.rejected.iter().map(|e| e.to_string()).collect();

        if batch.is_empty() {
            log::info!(
                "Nothing to merge for profile '{}': {} candidate(s), {} rejected",
                profile_id,
                candidates.len(),
                rejected.len()
            );
            status::record_analysis();
            return Ok(AnalysisReport {
                profile_id: profile_id.to_string(),
                batch_id: None,
                observed_at,
                outcome: AnalysisOutcome::NoUsableTraits,
                candidates_seen: candidates.len(),
                rejected,
                extractor_degraded: None,
            });
        }

        let store = self.store_for(profile_id);
        let result = self
            .reconciler
            .reconcile(&store, batch.traits, observed_at)
            .await?;
        let outcome = match result.outcome {
            BatchOutcome::Applied { created, updated } => {
                self.persist(&store);
                AnalysisOutcome::Applied { created, updated }
            }
            BatchOutcome::DuplicateSkipped => AnalysisOutcome::DuplicateSkipped,
        };
        status::record_analysis();

        Ok(AnalysisReport {
            profile_id: profile_id.to_string(),
            batch_id: Some(result.batch_id),
            observed_at,
            outcome,
            candidates_seen: candidates.len(),
            rejected,
            extractor_degraded: None,
        })
    }

    // --- Read path ---

    /// Point-in-time snapshot of a profile. Unknown profiles answer an
    /// empty snapshot; trait lookups on it return `None` as usual.
    pub fn snapshot(&self, profile_id: &str) -> ProfileSnapshot {
        self.store_for(profile_id).snapshot()
    }

    /// Ids of every profile this engine has touched.
    pub fn profile_ids(&self) -> Vec<String> {
        self.registry.ids()
    }

    // --- Administrative surface ---

    /// Erase a profile: its live state and its persisted snapshot. Goes
    /// through the profile's write gate like any other mutation.
    pub async fn purge_profile(&self, profile_id: &str) -> Result<(), EngineError> {
        let store = self.store_for(profile_id);
        store
            .purge(self.config.lock_mode, self.config.apply_timeout())
            .await?;
        if let Some(persistence) = &self.persistence {
            persistence.delete(profile_id)?;
        }
        log::info!("Purged profile '{}'", profile_id);
        Ok(())
    }

    /// Remove a single trait from a profile, addressed by display name or
    /// canonical key. Returns whether the trait existed.
    pub async fn purge_trait(&self, profile_id: &str, name: &str) -> Result<bool, EngineError> {
        let key = TraitKey::derive(name).ok_or_else(|| EngineError::InvalidTraitData {
            name: name.to_string(),
            reason: "name is empty after canonicalization".to_string(),
        })?;
        let store = self.store_for(profile_id);
        let removed = store
            .remove_trait(&key, self.config.lock_mode, self.config.apply_timeout())
            .await?;
        if removed {
            self.persist(&store);
            log::info!("Purged trait '{}' from profile '{}'", key, profile_id);
        }
        Ok(removed)
    }
}
