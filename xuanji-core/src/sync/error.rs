//! Sync error types.

use thiserror::Error;

use super::version::VersionError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No server configured.
    #[error("Sync not configured. Add sync.server_url to config.")]
    NotConfigured,

    /// Server unreachable, or a request timed out.
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// Unexpected status or payload shape.
    #[error("Sync protocol error: {0}")]
    Protocol(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Reserved for merge strategies; downloads currently resolve by policy.
    #[error("Conflict on {table}/{record_id}")]
    Conflict { table: String, record_id: String },

    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Table '{0}' is not registered for sync")]
    UnknownTable(String),

    #[error("Invalid version: {0}")]
    Version(#[from] VersionError),
}

impl SyncError {
    pub(crate) fn from_http(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            SyncError::Connectivity(err.to_string())
        } else if err.is_decode() {
            SyncError::Protocol(format!("malformed response: {}", err))
        } else {
            SyncError::Connectivity(err.to_string())
        }
    }
}
