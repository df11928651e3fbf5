//! Engine error taxonomy.
//!
//! Every variant is recoverable from the caller's point of view: candidate
//! data problems are absorbed item-by-item during normalization, lock and
//! timeout conditions surface so the caller can pick a retry policy, and
//! persistence problems degrade to logged warnings while the in-memory
//! profile stays authoritative.

use thiserror::Error;

/// Errors produced by the personality engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A candidate trait could not be normalized (unusable name or strength).
    /// Dropped per item; the surrounding batch continues.
    #[error("invalid trait data for '{name}': {reason}")]
    InvalidTraitData { name: String, reason: String },

    /// The batch contained no usable traits after normalization.
    /// The profile is left unchanged.
    #[error("batch contains no usable traits")]
    EmptyBatch,

    /// Another reconciliation for the same profile is already in flight and
    /// the caller chose fail-fast locking.
    #[error("profile '{0}' is locked by an in-flight reconciliation")]
    ProfileLocked(String),

    /// The batch application exceeded its wall-clock budget while queued.
    /// The profile is guaranteed to be at its pre-batch state.
    #[error("reconciliation for profile '{profile_id}' timed out after {waited_ms}ms")]
    ReconciliationTimeout { profile_id: String, waited_ms: u64 },

    /// The upstream extractor could not be reached or failed mid-call.
    /// The extractor adapter degrades this to an empty candidate batch.
    #[error("trait extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// A persisted snapshot declares a format version this build does not
    /// read. The loader degrades to an empty profile.
    #[error("unsupported snapshot format version {found} (this build reads {supported})")]
    UnsupportedSnapshotVersion { found: u32, supported: u32 },

    /// Engine configuration failed validation.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot file I/O failed.
    #[error("snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    /// Snapshot (de)serialization failed.
    #[error("snapshot encoding error: {0}")]
    SnapshotCodec(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether a caller can reasonably retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProfileLocked(_)
                | Self::ReconciliationTimeout { .. }
                | Self::ExtractionUnavailable(_)
        )
    }
}
