//! Reconciliation with the remote sync service.
//!
//! Two strategies share one engine:
//!
//! - **Full sync** compares per-table versions with the server and
//!   re-downloads every table that is behind.
//! - **Incremental sync** uploads the local change log in batches, then
//!   downloads and applies remote changes since the last cursor.
//!
//! Both are best-effort: per-table and per-change failures are counted in
//! [`SyncStats`] rather than aborting the run. Only an unreachable server,
//! a planning failure, or an overlapping run return `Err`.

mod auto;
mod client;
mod engine;
mod error;
mod plan;
mod protocol;
mod result;
mod status;
mod tables;
mod version;

pub use auto::AutoSync;
pub use client::RemoteClient;
pub use engine::SyncEngine;
pub use error::SyncError;
pub use plan::{build_plan, DownloadTask, SyncPlan};
pub use protocol::{
    ChangesResponse, ChangesUpload, RecordsUpload, RemoteChange, TableSnapshot, VersionsResponse,
};
pub use result::{SyncKind, SyncPhase, SyncResult, SyncStats};
pub use status::SyncStatus;
pub use tables::SyncTables;
pub use version::{compare, SemVer, VersionError};
