use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::{MappingError, Row};

/// A local key/value preference. Not synchronized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            updated_at: Utc::now(),
        }
    }
}

impl Entity for Setting {
    type Id = String;
    const TABLE: &'static str = "settings";
    const ID_COLUMN: &'static str = "key";

    fn id(&self) -> String {
        self.key.clone()
    }

    fn to_row(&self) -> Row {
        Row::with_capacity(3)
            .with("key", self.key.as_str())
            .with("value", self.value.as_str())
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            key: row.text("key")?,
            value: row.text("value")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_row_roundtrip() {
        let setting = Setting::new("theme", "dark");
        assert_eq!(Setting::from_row(&setting.to_row()).unwrap(), setting);
    }
}
