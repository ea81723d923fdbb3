use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::{MappingError, Row, Value};

/// Primary key of an entity table.
pub trait EntityId: Clone + Send + Sync + fmt::Display + Into<Value> + 'static {
    /// Parses an id from its text form, as carried in change-log entries.
    fn parse_id(raw: &str) -> Option<Self>;
}

impl EntityId for i64 {
    fn parse_id(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl EntityId for String {
    fn parse_id(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

/// A typed record owned by exactly one table.
///
/// `to_row` and `from_row` must be lossless inverses. The serde
/// representation is the wire format used by sync.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Id: EntityId;

    /// Owning table.
    const TABLE: &'static str;

    /// Primary key column.
    const ID_COLUMN: &'static str = "id";

    /// Whether local writes are recorded in the change log for upload.
    const TRACK_CHANGES: bool = false;

    fn id(&self) -> Self::Id;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self, MappingError>;
}
