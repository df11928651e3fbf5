//! Durable profile snapshots.
//!
//! Persistence is best-effort and strictly subordinate to the in-memory
//! profile: a failed save degrades to a logged error, and a missing,
//! corrupt, or version-incompatible file on load degrades to an empty
//! profile. The process never crashes over durability.
//!
//! On-disk format: one JSON document per profile,
//! `{format_version, profile_id, saved_at, last_fingerprint, traits}`.
//! Writes go to a temp file first and land with an atomic rename, so a
//! reader or a crash mid-write never sees a torn snapshot.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::profile::record::TraitRecord;
use crate::profile::store::{ProfileSnapshot, ProfileState};
use crate::reconcile::fingerprint::BatchFingerprint;

/// Snapshot format this build reads and writes.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// PersistedProfile
// ---------------------------------------------------------------------------

/// Serialized form of one profile snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedProfile {
    pub format_version: u32,
    pub profile_id: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fingerprint: Option<BatchFingerprint>,
    pub traits: Vec<TraitRecord>,
}

impl PersistedProfile {
    pub fn from_snapshot(snapshot: &ProfileSnapshot) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            profile_id: snapshot.profile_id().to_string(),
            saved_at: Utc::now(),
            last_fingerprint: snapshot.last_fingerprint().cloned(),
            traits: snapshot.records().cloned().collect(),
        }
    }

    /// Rebuild in-memory state. The publish counter restarts at zero; it
    /// tracks commits within one process, not across restarts.
    ///
    /// Snapshot files are outside the engine's control (hand-edited,
    /// written by another tool), so loaded strengths are not trusted:
    /// a finite out-of-range value is clamped back into `[0, 1]` and a
    /// non-finite one drops the record, with a warning either way.
    pub fn into_state(self) -> ProfileState {
        let mut state = ProfileState {
            last_fingerprint: self.last_fingerprint,
            ..ProfileState::default()
        };
        for mut record in self.traits {
            if !record.strength.is_finite() {
                log::warn!(
                    "Dropping trait '{}' from snapshot of profile '{}': strength {} is not finite",
                    record.key,
                    self.profile_id,
                    record.strength
                );
                continue;
            }
            let clamped = record.strength.clamp(0.0, 1.0);
            if clamped != record.strength {
                log::warn!(
                    "Clamping strength of trait '{}' in snapshot of profile '{}': {} -> {}",
                    record.key,
                    self.profile_id,
                    record.strength,
                    clamped
                );
                record.strength = clamped;
            }
            state.traits.insert(record.key.clone(), record);
        }
        state
    }
}

// ---------------------------------------------------------------------------
// ProfilePersistence trait
// ---------------------------------------------------------------------------

/// Storage backend for profile snapshots.
pub trait ProfilePersistence: Send + Sync + fmt::Debug {
    /// Write a full snapshot of one profile.
    fn save(&self, snapshot: &ProfileSnapshot) -> Result<(), EngineError>;

    /// Load the most recent snapshot for a profile.
    ///
    /// `Ok(None)` means no snapshot exists. Unreadable or
    /// version-incompatible snapshots are errors; callers on the startup
    /// path should go through [`ProfilePersistence::load_or_empty`].
    fn load(&self, profile_id: &str) -> Result<Option<ProfileState>, EngineError>;

    /// Remove any persisted snapshot for a profile. Removing a profile that
    /// was never saved is not an error.
    fn delete(&self, profile_id: &str) -> Result<(), EngineError>;

    /// Load a profile, degrading every failure to an empty state with a
    /// logged error.
    fn load_or_empty(&self, profile_id: &str) -> ProfileState {
        match self.load(profile_id) {
            Ok(Some(state)) => {
                log::info!(
                    "Loaded persisted profile '{}' ({} traits)",
                    profile_id,
                    state.traits.len()
                );
                state
            }
            Ok(None) => ProfileState::default(),
            Err(e) => {
                log::error!(
                    "Ignoring unusable snapshot for profile '{}', starting empty: {}",
                    profile_id,
                    e
                );
                ProfileState::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JsonProfilePersistence
// ---------------------------------------------------------------------------

/// File-per-profile JSON persistence under one directory.
#[derive(Debug, Clone)]
pub struct JsonProfilePersistence {
    dir: PathBuf,
}

impl JsonProfilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for a profile id, with filesystem-hostile characters
    /// replaced.
    fn path_for(&self, profile_id: &str) -> PathBuf {
        let stem: String = profile_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stem = if stem.is_empty() {
            "_".to_string()
        } else {
            stem
        };
        self.dir.join(format!("{stem}.json"))
    }
}

impl ProfilePersistence for JsonProfilePersistence {
    fn save(&self, snapshot: &ProfileSnapshot) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.dir)?;

        let record = PersistedProfile::from_snapshot(snapshot);
        let json = serde_json::to_string_pretty(&record)?;
        let path = self.path_for(snapshot.profile_id());
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        log::debug!(
            "Persisted profile '{}' ({} traits) to '{}'",
            snapshot.profile_id(),
            snapshot.len(),
            path.display()
        );
        Ok(())
    }

    fn load(&self, profile_id: &str) -> Result<Option<ProfileState>, EngineError> {
        let path = self.path_for(profile_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Check the declared version before deserializing the full record;
        // a future format may not even share field shapes.
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let found = value
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found != SNAPSHOT_FORMAT_VERSION {
            return Err(EngineError::UnsupportedSnapshotVersion {
                found,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }

        let record: PersistedProfile = serde_json::from_value(value)?;
        if record.profile_id != profile_id {
            log::warn!(
                "Snapshot at '{}' declares profile '{}', expected '{}'",
                path.display(),
                record.profile_id,
                profile_id
            );
        }
        Ok(Some(record.into_state()))
    }

    fn delete(&self, profile_id: &str) -> Result<(), EngineError> {
        let path = self.path_for(profile_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Deleted persisted profile at '{}'", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
