//! Durable log of local mutations awaiting upload.
//!
//! Entries are appended in the same transaction as the row write they
//! describe and only ever move from `pending` to `synced`, after the remote
//! acknowledges the batch that carried them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::{json_text, MappingError, Row, Select, Store, StoreError, StoreTx, Value};

pub const TABLE: &str = "pending_sync_changes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Insert => write!(f, "insert"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(ChangeType::Insert),
            "update" => Ok(ChangeType::Update),
            "delete" => Ok(ChangeType::Delete),
            _ => Err(format!("Invalid change type '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Synced,
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeStatus::Pending => write!(f, "pending"),
            ChangeStatus::Synced => write!(f, "synced"),
        }
    }
}

impl FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ChangeStatus::Pending),
            "synced" => Ok(ChangeStatus::Synced),
            _ => Err(format!("Invalid sync status '{}'", s)),
        }
    }
}

/// One change-log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingChange {
    pub id: i64,
    pub change_type: ChangeType,
    pub table_name: String,
    pub record_id: String,
    pub record_data: serde_json::Value,
    pub sync_status: ChangeStatus,
    pub created_at: DateTime<Utc>,
}

impl PendingChange {
    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            id: row.i64("id")?,
            change_type: row
                .text("change_type")?
                .parse()
                .map_err(|e: String| MappingError::invalid("change_type", e))?,
            table_name: row.text("table_name")?,
            record_id: row.text("record_id")?,
            record_data: row.json("record_data")?,
            sync_status: row
                .text("sync_status")?
                .parse()
                .map_err(|e: String| MappingError::invalid("sync_status", e))?,
            created_at: row.timestamp("created_at")?,
        })
    }
}

/// Appends a pending entry inside the caller's transaction.
pub async fn record(
    tx: &mut StoreTx,
    change_type: ChangeType,
    table_name: &str,
    record_id: &str,
    record_data: &serde_json::Value,
) -> Result<(), StoreError> {
    let row = Row::with_capacity(6)
        .with("change_type", change_type.to_string())
        .with("table_name", table_name)
        .with("record_id", record_id)
        .with("record_data", json_text(record_data))
        .with("sync_status", ChangeStatus::Pending.to_string())
        .with("created_at", Utc::now());
    tx.insert(TABLE, &row).await?;
    Ok(())
}

/// Up to `limit` pending entries, oldest first.
pub async fn pending(store: &Store, limit: usize) -> Result<Vec<PendingChange>, StoreError> {
    let select = Select::from(TABLE)
        .filter("sync_status = ?", vec![Value::from(ChangeStatus::Pending.to_string())])
        .order_by("created_at, id")
        .limit(limit as i64);
    let rows = store.query(&select).await?;
    rows.iter()
        .map(|row| PendingChange::from_row(row).map_err(StoreError::from))
        .collect()
}

/// Flips the given entries to `synced`. Entries already synced are left as-is.
pub async fn mark_synced(store: &Store, ids: &[i64]) -> Result<u64, StoreError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let filter = format!("sync_status = 'pending' AND id IN ({})", placeholders);
    let args: Vec<Value> = ids.iter().map(|id| Value::from(*id)).collect();
    store
        .update(
            TABLE,
            &Row::new().with("sync_status", ChangeStatus::Synced.to_string()),
            &filter,
            &args,
        )
        .await
}

pub async fn count_pending(store: &Store, table_name: &str) -> Result<i64, StoreError> {
    let rows = store
        .raw_query(
            "SELECT COUNT(*) AS n FROM pending_sync_changes WHERE sync_status = 'pending' AND table_name = ?",
            &[Value::from(table_name)],
        )
        .await?;
    Ok(rows.first().map(|r| r.i64("n")).transpose()?.unwrap_or(0))
}

/// Whether a record has a local change not yet acknowledged by the remote.
pub async fn has_pending(
    tx: &mut StoreTx,
    table_name: &str,
    record_id: &str,
) -> Result<bool, StoreError> {
    let rows = tx
        .raw_query(
            "SELECT 1 AS found FROM pending_sync_changes WHERE sync_status = 'pending' AND table_name = ? AND record_id = ? LIMIT 1",
            &[Value::from(table_name), Value::from(record_id)],
        )
        .await?;
    Ok(!rows.is_empty())
}

/// Deletes synced entries created before `older_than`.
pub async fn purge_synced(store: &Store, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
    let removed = store
        .delete(
            TABLE,
            "sync_status = 'synced' AND created_at < ?",
            &[Value::from(older_than)],
        )
        .await?;
    if removed > 0 {
        tracing::debug!(removed, "purged synced change-log entries");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seed(store: &Store, entries: Vec<(ChangeType, &'static str, &'static str)>) {
        store
            .transaction(move |tx| {
                Box::pin(async move {
                    for (change_type, table, id) in entries {
                        record(tx, change_type, table, id, &json!({ "id": id })).await?;
                    }
                    Ok(())
                })
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_change_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChangeType::Insert).unwrap(), "\"insert\"");
        assert_eq!(ChangeType::from_str("DELETE").unwrap(), ChangeType::Delete);
        assert!(ChangeType::from_str("upsert").is_err());
    }

    #[tokio::test]
    async fn test_pending_is_oldest_first_and_bounded() {
        let store = Store::open_in_memory().await.unwrap();
        seed(
            &store,
            vec![
                (ChangeType::Insert, "cases", "a"),
                (ChangeType::Update, "cases", "a"),
                (ChangeType::Delete, "cases", "b"),
            ],
        )
        .await;

        let all = pending(&store, 10).await.unwrap();
        let kinds: Vec<ChangeType> = all.iter().map(|c| c.change_type).collect();
        assert_eq!(kinds, vec![ChangeType::Insert, ChangeType::Update, ChangeType::Delete]);
        assert_eq!(all[0].record_data, json!({ "id": "a" }));

        let first_two = pending(&store, 2).await.unwrap();
        assert_eq!(first_two.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_synced_moves_out_of_pending() {
        let store = Store::open_in_memory().await.unwrap();
        seed(
            &store,
            vec![(ChangeType::Insert, "cases", "a"), (ChangeType::Insert, "cases", "b")],
        )
        .await;
        let changes = pending(&store, 10).await.unwrap();

        assert_eq!(mark_synced(&store, &[changes[0].id]).await.unwrap(), 1);
        // Already synced: no-op.
        assert_eq!(mark_synced(&store, &[changes[0].id]).await.unwrap(), 0);

        let left = pending(&store, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].record_id, "b");
        assert_eq!(count_pending(&store, "cases").await.unwrap(), 1);
        assert_eq!(count_pending(&store, "hexagrams").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_only_removes_synced() {
        let store = Store::open_in_memory().await.unwrap();
        seed(
            &store,
            vec![(ChangeType::Insert, "cases", "a"), (ChangeType::Insert, "cases", "b")],
        )
        .await;
        let changes = pending(&store, 10).await.unwrap();
        mark_synced(&store, &[changes[0].id]).await.unwrap();

        let removed = purge_synced(&store, Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(pending(&store, 10).await.unwrap().len(), 1);
    }
}
