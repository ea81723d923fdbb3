//! Tunables for the sync engine. Cache sizing lives in
//! [`CacheConfig`](crate::cache::CacheConfig).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do with a downloaded change for a record that also has an
/// unacknowledged local change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Apply the remote change, overwriting the local edit.
    #[default]
    RemoteWins,
    /// Skip the remote change and count it as a conflict.
    KeepLocalPending,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::RemoteWins => write!(f, "remote_wins"),
            ConflictPolicy::KeepLocalPending => write!(f, "keep_local_pending"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "remote_wins" => Ok(ConflictPolicy::RemoteWins),
            "keep_local_pending" => Ok(ConflictPolicy::KeepLocalPending),
            _ => Err(format!(
                "Invalid conflict policy '{}'. Valid options: remote_wins, keep_local_pending",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Timeout for every request except the health probe.
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Maximum pending changes collected per incremental run.
    pub change_batch_limit: usize,
    /// Records or changes per upload request.
    pub upload_batch_size: usize,
    pub conflict_policy: ConflictPolicy,
    /// Days a synced change-log entry is kept before it is purged.
    pub synced_retention_days: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
            probe_timeout_secs: 10,
            change_batch_limit: 1000,
            upload_batch_size: 100,
            conflict_policy: ConflictPolicy::RemoteWins,
            synced_retention_days: 7,
        }
    }
}

impl SyncSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn synced_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.synced_retention_days))
    }
}
