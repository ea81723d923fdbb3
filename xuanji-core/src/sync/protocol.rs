//! Wire types for the remote sync contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::version::SemVer;
use crate::changelog::{ChangeType, PendingChange};

/// `GET /versions`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub versions: BTreeMap<String, SemVer>,
}

/// `GET /data/{table}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub records: Vec<serde_json::Value>,
    pub version: SemVer,
}

/// `POST /data/{table}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsUpload {
    pub records: Vec<serde_json::Value>,
}

/// A change as carried over the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub change_type: ChangeType,
    pub table_name: String,
    pub record_id: String,
    #[serde(default)]
    pub record_data: serde_json::Value,
}

impl From<&PendingChange> for RemoteChange {
    fn from(change: &PendingChange) -> Self {
        Self {
            change_type: change.change_type,
            table_name: change.table_name.clone(),
            record_id: change.record_id.clone(),
            record_data: change.record_data.clone(),
        }
    }
}

/// `GET /sync/changes`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    pub changes: Vec<RemoteChange>,
}

/// `POST /sync/changes/{table}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesUpload {
    pub changes: Vec<RemoteChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_versions_decode() {
        let body = json!({"versions": {"hexagrams": "1.1.0", "trigrams": "2"}});
        let parsed: VersionsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.versions["hexagrams"], SemVer::new(1, 1, 0));
        assert_eq!(parsed.versions["trigrams"], SemVer::new(2, 0, 0));
    }

    #[test]
    fn test_change_type_is_lowercase_on_the_wire() {
        let change = RemoteChange {
            change_type: ChangeType::Insert,
            table_name: "cases".into(),
            record_id: "abc123".into(),
            record_data: json!({"id": "abc123"}),
        };
        let value = serde_json::to_value(ChangesUpload { changes: vec![change] }).unwrap();
        assert_eq!(value["changes"][0]["change_type"], "insert");
        assert_eq!(value["changes"][0]["record_id"], "abc123");
    }

    #[test]
    fn test_delete_change_without_data() {
        let body = json!({"change_type": "delete", "table_name": "cases", "record_id": "x"});
        let change: RemoteChange = serde_json::from_value(body).unwrap();
        assert_eq!(change.change_type, ChangeType::Delete);
        assert!(change.record_data.is_null());
    }
}
