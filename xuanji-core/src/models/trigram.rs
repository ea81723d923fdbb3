use serde::{Deserialize, Serialize};
use std::fmt;

use crate::repository::Entity;
use crate::store::{MappingError, Row};

/// One of the eight trigrams (bagua).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigram {
    pub id: i64,
    pub name: String,
    /// Three lines, bottom first: `1` solid, `0` broken.
    pub binary_code: String,
    pub element: String,
    pub nature: String,
}

impl Trigram {
    pub fn new(id: i64, name: impl Into<String>, binary_code: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            binary_code: binary_code.into(),
            element: String::new(),
            nature: String::new(),
        }
    }

    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = element.into();
        self
    }

    pub fn with_nature(mut self, nature: impl Into<String>) -> Self {
        self.nature = nature.into();
        self
    }
}

impl fmt::Display for Trigram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.binary_code)
    }
}

impl Entity for Trigram {
    type Id = i64;
    const TABLE: &'static str = "trigrams";

    fn id(&self) -> i64 {
        self.id
    }

    fn to_row(&self) -> Row {
        Row::with_capacity(5)
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("binary_code", self.binary_code.as_str())
            .with("element", self.element.as_str())
            .with("nature", self.nature.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            binary_code: row.text("binary_code")?,
            element: row.text("element")?,
            nature: row.text("nature")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigram_row_roundtrip() {
        let trigram = Trigram::new(1, "Qian", "111")
            .with_element("metal")
            .with_nature("heaven");

        let parsed = Trigram::from_row(&trigram.to_row()).unwrap();
        assert_eq!(parsed, trigram);
    }

    #[test]
    fn test_trigram_display() {
        assert_eq!(Trigram::new(8, "Kun", "000").to_string(), "Kun (000)");
    }
}
