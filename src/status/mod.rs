//! Process-wide engine status.
//!
//! Explicit lifecycle instead of ambient mutable globals: the board is
//! marked started when the service constructs its engine, accumulates
//! activity as analyses complete, and resets only through an explicit
//! administrative call. Dashboards and health endpoints read it through
//! [`current`], never through the raw static.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;

/// Point-in-time view of the engine's process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    /// Whether an engine has been started in this process.
    pub running: bool,
    /// When the engine was started, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Most recent completed analysis, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    /// Analyses completed since start (or the last reset).
    pub analyses_completed: u64,
}

/// Thread-safe holder of one [`EngineStatus`].
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: RwLock<EngineStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the engine running. Re-marking an already-running board keeps
    /// the original start time.
    pub fn mark_started(&self, at: DateTime<Utc>) {
        let mut status = self.inner.write();
        status.running = true;
        if status.started_at.is_none() {
            status.started_at = Some(at);
        }
    }

    /// Record one completed analysis.
    pub fn record_analysis(&self, at: DateTime<Utc>) {
        let mut status = self.inner.write();
        status.last_activity = Some(at);
        status.analyses_completed += 1;
    }

    /// Snapshot the current status.
    pub fn current(&self) -> EngineStatus {
        self.inner.read().clone()
    }

    /// Administrative reset back to the never-started state.
    pub fn reset(&self) {
        *self.inner.write() = EngineStatus::default();
    }
}

/// Global status board for the process.
static ENGINE_STATUS: Lazy<StatusBoard> = Lazy::new(StatusBoard::new);

/// Mark the process-wide engine started.
pub fn mark_started() {
    ENGINE_STATUS.mark_started(Utc::now());
}

/// Record one completed analysis on the process-wide board.
pub fn record_analysis() {
    ENGINE_STATUS.record_analysis(Utc::now());
}

/// Read the process-wide status.
pub fn current() -> EngineStatus {
    ENGINE_STATUS.current()
}

/// Administrative reset of the process-wide status.
pub fn reset() {
    ENGINE_STATUS.reset();
}
