use serde::{Deserialize, Serialize};
use std::fmt;

use crate::repository::Entity;
use crate::store::{json_text, MappingError, Row};

/// A hexagram, identified by its King Wen number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hexagram {
    pub id: i64,
    pub name: String,
    /// Six lines, bottom first.
    pub binary_code: String,
    pub upper_trigram_id: i64,
    pub lower_trigram_id: i64,
    #[serde(default)]
    pub judgment: String,
    #[serde(default)]
    pub image: String,
    /// Line texts, bottom first.
    #[serde(default)]
    pub lines: Vec<String>,
}

impl Hexagram {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        binary_code: impl Into<String>,
        upper_trigram_id: i64,
        lower_trigram_id: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            binary_code: binary_code.into(),
            upper_trigram_id,
            lower_trigram_id,
            judgment: String::new(),
            image: String::new(),
            lines: Vec::new(),
        }
    }

    pub fn with_judgment(mut self, judgment: impl Into<String>) -> Self {
        self.judgment = judgment.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }
}

impl fmt::Display for Hexagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!("{}. {}", self.id, self.name);
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.chars().count()))?;
        writeln!(f, "Code: {}", self.binary_code)?;

        if !self.judgment.is_empty() {
            writeln!(f, "\nJudgment:\n{}", self.judgment)?;
        }
        if !self.image.is_empty() {
            writeln!(f, "\nImage:\n{}", self.image)?;
        }
        if !self.lines.is_empty() {
            writeln!(f, "\nLines:")?;
            for (i, line) in self.lines.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, line)?;
            }
        }

        Ok(())
    }
}

impl Entity for Hexagram {
    type Id = i64;
    const TABLE: &'static str = "hexagrams";

    fn id(&self) -> i64 {
        self.id
    }

    fn to_row(&self) -> Row {
        Row::with_capacity(8)
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("binary_code", self.binary_code.as_str())
            .with("upper_trigram_id", self.upper_trigram_id)
            .with("lower_trigram_id", self.lower_trigram_id)
            .with("judgment", self.judgment.as_str())
            .with("image", self.image.as_str())
            .with("lines", json_text(&self.lines))
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            id: row.i64("id")?,
            name: row.text("name")?,
            binary_code: row.text("binary_code")?,
            upper_trigram_id: row.i64("upper_trigram_id")?,
            lower_trigram_id: row.i64("lower_trigram_id")?,
            judgment: row.text("judgment")?,
            image: row.text("image")?,
            lines: row.json("lines")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qian() -> Hexagram {
        Hexagram::new(1, "Qian", "111111", 1, 1)
            .with_judgment("Sublime success.")
            .with_image("Heaven moves with strength.")
            .with_lines(vec!["Hidden dragon.".into(), "Dragon in the field.".into()])
    }

    #[test]
    fn test_hexagram_row_roundtrip() {
        let hexagram = qian();
        assert_eq!(Hexagram::from_row(&hexagram.to_row()).unwrap(), hexagram);
    }

    #[test]
    fn test_hexagram_row_roundtrip_empty_fields() {
        let hexagram = Hexagram::new(2, "Kun", "000000", 8, 8);
        assert_eq!(Hexagram::from_row(&hexagram.to_row()).unwrap(), hexagram);
    }

    #[test]
    fn test_hexagram_wire_defaults() {
        let json = r#"{"id":2,"name":"Kun","binary_code":"000000","upper_trigram_id":8,"lower_trigram_id":8}"#;
        let hexagram: Hexagram = serde_json::from_str(json).unwrap();
        assert!(hexagram.lines.is_empty());
        assert!(hexagram.judgment.is_empty());
    }

    #[test]
    fn test_hexagram_display() {
        let output = qian().to_string();
        assert!(output.contains("1. Qian"));
        assert!(output.contains("Judgment:"));
        assert!(output.contains("  2. Dragon in the field."));
    }
}
