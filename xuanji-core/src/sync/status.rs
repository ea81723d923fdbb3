//! Per-table sync cursors (`sync_status`). Rows are only ever upserted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::version::SemVer;
use crate::store::{MappingError, Row, Select, Store, StoreError, StoreTx, Value};

const TABLE: &str = "sync_status";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub table_name: String,
    pub sync_version: SemVer,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_changes: i64,
    /// Consecutive failed runs touching this table; reset on success.
    pub sync_errors: i64,
}

impl SyncStatus {
    /// Status of a table that has never been synced.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            sync_version: SemVer::ZERO,
            last_sync_time: None,
            pending_changes: 0,
            sync_errors: 0,
        }
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            table_name: row.text("table_name")?,
            sync_version: row
                .text("sync_version")?
                .parse::<SemVer>()
                .map_err(|e| MappingError::invalid("sync_version", e))?,
            last_sync_time: row.opt_timestamp("last_sync_time")?,
            pending_changes: row.i64("pending_changes")?,
            sync_errors: row.i64("sync_errors")?,
        })
    }

    fn to_row(&self) -> Row {
        Row::with_capacity(5)
            .with("table_name", self.table_name.as_str())
            .with("sync_version", self.sync_version.to_string())
            .with("last_sync_time", self.last_sync_time)
            .with("pending_changes", self.pending_changes)
            .with("sync_errors", self.sync_errors)
    }
}

pub(crate) async fn load_all(store: &Store) -> Result<BTreeMap<String, SyncStatus>, StoreError> {
    let rows = store.query(&Select::from(TABLE)).await?;
    rows.iter()
        .map(|row| -> Result<(String, SyncStatus), StoreError> {
            let status = SyncStatus::from_row(row)?;
            Ok((status.table_name.clone(), status))
        })
        .collect()
}

pub(crate) async fn load(store: &Store, table: &str) -> Result<SyncStatus, StoreError> {
    let select = Select::from(TABLE).filter("table_name = ?", vec![Value::from(table)]);
    match store.query(&select).await?.first() {
        Some(row) => Ok(SyncStatus::from_row(row)?),
        None => Ok(SyncStatus::new(table)),
    }
}

async fn load_tx(tx: &mut StoreTx, table: &str) -> Result<SyncStatus, StoreError> {
    match tx.find_row(TABLE, "table_name", Value::from(table)).await? {
        Some(row) => Ok(SyncStatus::from_row(&row)?),
        None => Ok(SyncStatus::new(table)),
    }
}

/// Records a successfully applied table version in the same transaction as
/// the data it describes.
pub(crate) async fn mark_version(
    tx: &mut StoreTx,
    table: &str,
    version: SemVer,
) -> Result<(), StoreError> {
    let mut status = load_tx(tx, table).await?;
    status.sync_version = version;
    status.sync_errors = 0;
    tx.insert(TABLE, &status.to_row()).await?;
    Ok(())
}

/// Bumps the error counter and leaves everything else untouched.
pub(crate) async fn record_failure(store: &Store, table: &str) -> Result<(), StoreError> {
    store
        .execute(
            "INSERT INTO sync_status (table_name, sync_errors) VALUES (?, 1) \
             ON CONFLICT(table_name) DO UPDATE SET sync_errors = sync_errors + 1",
            &[Value::from(table)],
        )
        .await?;
    Ok(())
}

/// End-of-run bookkeeping for an incremental sync.
pub(crate) async fn refresh(
    store: &Store,
    table: &str,
    pending_changes: i64,
    failed: bool,
    synced_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    let table = table.to_string();
    store
        .transaction(move |tx| {
            Box::pin(async move {
                let mut status = load_tx(tx, &table).await?;
                status.pending_changes = pending_changes;
                status.sync_errors = if failed { status.sync_errors + 1 } else { 0 };
                if synced_at.is_some() {
                    status.last_sync_time = synced_at;
                }
                tx.insert(TABLE, &status.to_row()).await?;
                Ok(())
            })
        })
        .await
}
