//! Registry of tables the engine may touch, each bound to its entity type so
//! wire JSON is decoded through the typed record before it reaches the store.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::models::{DivinationCase, Hexagram, Trigram};
use crate::repository::{Entity, EntityId};
use crate::store::{MappingError, Row, Value};

pub(crate) trait SyncedTable: Send + Sync {
    fn name(&self) -> &'static str;

    fn id_column(&self) -> &'static str;

    fn tracks_changes(&self) -> bool;

    /// Wire record to `(record id, row)`.
    fn decode_record(&self, record: serde_json::Value) -> Result<(String, Row), MappingError>;

    /// Stored row to wire record.
    fn encode_row(&self, row: &Row) -> Result<serde_json::Value, MappingError>;

    fn key_value(&self, record_id: &str) -> Option<Value>;
}

struct TableBinding<T>(PhantomData<fn() -> T>);

impl<T: Entity> SyncedTable for TableBinding<T> {
    fn name(&self) -> &'static str {
        T::TABLE
    }

    fn id_column(&self) -> &'static str {
        T::ID_COLUMN
    }

    fn tracks_changes(&self) -> bool {
        T::TRACK_CHANGES
    }

    fn decode_record(&self, record: serde_json::Value) -> Result<(String, Row), MappingError> {
        let entity: T =
            serde_json::from_value(record).map_err(|e| MappingError::invalid("record", e))?;
        Ok((entity.id().to_string(), entity.to_row()))
    }

    fn encode_row(&self, row: &Row) -> Result<serde_json::Value, MappingError> {
        let entity = T::from_row(row)?;
        serde_json::to_value(entity).map_err(|e| MappingError::invalid("record", e))
    }

    fn key_value(&self, record_id: &str) -> Option<Value> {
        T::Id::parse_id(record_id).map(Into::into)
    }
}

/// The set of tables a [`SyncEngine`](super::SyncEngine) synchronizes.
#[derive(Clone, Default)]
pub struct SyncTables {
    tables: BTreeMap<&'static str, Arc<dyn SyncedTable>>,
}

impl SyncTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference data plus user cases. Settings stay local.
    pub fn standard() -> Self {
        Self::new()
            .register::<Trigram>()
            .register::<Hexagram>()
            .register::<DivinationCase>()
    }

    pub fn register<T: Entity>(mut self) -> Self {
        self.tables
            .insert(T::TABLE, Arc::new(TableBinding::<T>(PhantomData)));
        self
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.keys().copied()
    }

    /// Tables whose local writes are uploaded as changes.
    pub fn tracked(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables
            .values()
            .filter(|t| t.tracks_changes())
            .map(|t| t.name())
    }

    pub(crate) fn get(&self, table: &str) -> Option<&Arc<dyn SyncedTable>> {
        self.tables.get(table)
    }
}

impl std::fmt::Debug for SyncTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tables.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_tables() {
        let tables = SyncTables::standard();
        let names: Vec<&str> = tables.names().collect();
        assert_eq!(names, vec!["cases", "hexagrams", "trigrams"]);
        assert_eq!(tables.tracked().collect::<Vec<_>>(), vec!["cases"]);
        assert!(!tables.contains("settings"));
    }

    #[test]
    fn test_decode_record_goes_through_entity() {
        let tables = SyncTables::standard();
        let hexagrams = tables.get("hexagrams").unwrap();

        let (id, row) = hexagrams
            .decode_record(json!({
                "id": 11, "name": "Tai", "binary_code": "111000",
                "upper_trigram_id": 8, "lower_trigram_id": 1
            }))
            .unwrap();
        assert_eq!(id, "11");
        assert_eq!(row.get("lines"), Some(&Value::Text("[]".into())));

        assert!(hexagrams.decode_record(json!({"id": "eleven"})).is_err());
    }

    #[test]
    fn test_key_value_parses_by_id_type() {
        let tables = SyncTables::standard();
        assert_eq!(
            tables.get("hexagrams").unwrap().key_value("7"),
            Some(Value::Integer(7))
        );
        assert_eq!(tables.get("hexagrams").unwrap().key_value("x"), None);
        assert_eq!(
            tables.get("cases").unwrap().key_value("abc"),
            Some(Value::Text("abc".into()))
        );
    }
}
