use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a sync run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    CheckingConnectivity,
    Planning,
    Executing,
    Finalizing,
    Completed,
    PartiallyFailed,
    Failed,
}

impl SyncPhase {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SyncPhase::CheckingConnectivity
                | SyncPhase::Planning
                | SyncPhase::Executing
                | SyncPhase::Finalizing
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::CheckingConnectivity => write!(f, "checking connectivity"),
            SyncPhase::Planning => write!(f, "planning"),
            SyncPhase::Executing => write!(f, "executing"),
            SyncPhase::Finalizing => write!(f, "finalizing"),
            SyncPhase::Completed => write!(f, "completed"),
            SyncPhase::PartiallyFailed => write!(f, "partially failed"),
            SyncPhase::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Full,
    Incremental,
    Push,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Full => write!(f, "full"),
            SyncKind::Incremental => write!(f, "incremental"),
            SyncKind::Push => write!(f, "push"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub tasks_planned: usize,
    pub tasks_failed: usize,
    /// Records or changes acknowledged by the server.
    pub uploaded: usize,
    /// Records or changes received from the server.
    pub downloaded: usize,
    /// Received items written locally.
    pub applied: usize,
    /// Remote changes skipped because of a pending local change.
    pub conflicts: usize,
    /// Failed uploads, downloads and change applications.
    pub errors: usize,
    pub modified_tables: BTreeSet<String>,
}

impl SyncStats {
    pub fn error_count(&self) -> usize {
        self.tasks_failed + self.errors
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub kind: SyncKind,
    /// False if any error count is nonzero, even when most work succeeded.
    pub success: bool,
    pub phase: SyncPhase,
    pub duration: Duration,
    pub stats: SyncStats,
    pub completed_at: DateTime<Utc>,
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        write!(
            f,
            "{} sync {} in {:.1}s: {} uploaded, {} downloaded, {} applied",
            self.kind,
            self.phase,
            self.duration.as_secs_f64(),
            s.uploaded,
            s.downloaded,
            s.applied
        )?;
        if s.conflicts > 0 {
            write!(f, ", {} conflicts", s.conflicts)?;
        }
        if s.error_count() > 0 {
            write!(f, ", {} errors", s.error_count())?;
        }
        Ok(())
    }
}
