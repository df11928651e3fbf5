//! Engine configuration.
//!
//! All merge/locking tunables live here rather than as hard-coded constants:
//! the decay factor, the history cap, and the queue-vs-fail-fast default for
//! concurrent writers are deployment decisions. Values deserialize from YAML
//! with per-field defaults, so a config file only needs to name what it
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// How a writer behaves when another batch application is already in flight
/// for the same profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Wait for the in-flight application, bounded by the apply budget.
    #[default]
    Queue,
    /// Give up immediately with `ProfileLocked`.
    FailFast,
}

/// Configuration for reconciliation and storage behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Weight given to a new observation versus retained history when a
    /// trait is re-observed. Must lie in (0, 1]. Defaults to 0.3.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,

    /// Maximum number of retained history points per trait record.
    /// Oldest entries are evicted first. Defaults to 50.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Writer behavior under contention. Defaults to queueing.
    #[serde(default)]
    pub lock_mode: LockMode,

    /// Wall-clock budget for a queued batch application, in milliseconds.
    /// Defaults to 5000.
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,

    /// Directory for persisted profile snapshots. `None` disables
    /// persistence; the profile then lives only in memory.
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
}

fn default_decay_factor() -> f64 {
    0.3
}

fn default_history_cap() -> usize {
    50
}

fn default_apply_timeout_ms() -> u64 {
    5000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_factor: default_decay_factor(),
            history_cap: default_history_cap(),
            lock_mode: LockMode::default(),
            apply_timeout_ms: default_apply_timeout_ms(),
            persist_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| EngineError::InvalidConfig(format!("YAML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate tunable ranges.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "decay_factor must be in (0, 1], got {}",
                self.decay_factor
            )));
        }
        if self.history_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "history_cap must be at least 1".to_string(),
            ));
        }
        if self.apply_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "apply_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The apply budget as a [`Duration`].
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }
}
