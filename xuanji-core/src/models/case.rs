use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::repository::Entity;
use crate::store::{json_text, MappingError, Row};

/// Divination technique a case was cast with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivinationMethod {
    Bazi,
    Qimen,
    Ziwei,
    Liuyao,
    Meihua,
}

impl fmt::Display for DivinationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivinationMethod::Bazi => write!(f, "bazi"),
            DivinationMethod::Qimen => write!(f, "qimen"),
            DivinationMethod::Ziwei => write!(f, "ziwei"),
            DivinationMethod::Liuyao => write!(f, "liuyao"),
            DivinationMethod::Meihua => write!(f, "meihua"),
        }
    }
}

impl FromStr for DivinationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bazi" => Ok(DivinationMethod::Bazi),
            "qimen" => Ok(DivinationMethod::Qimen),
            "ziwei" => Ok(DivinationMethod::Ziwei),
            "liuyao" => Ok(DivinationMethod::Liuyao),
            "meihua" => Ok(DivinationMethod::Meihua),
            _ => Err(format!(
                "Invalid method '{}'. Valid options: bazi, qimen, ziwei, liuyao, meihua",
                s
            )),
        }
    }
}

/// A user-recorded reading. The method-specific chart lives in `payload`
/// and is not interpreted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DivinationCase {
    pub id: String,
    pub method: DivinationMethod,
    pub title: String,
    pub question: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub hexagram_id: Option<i64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DivinationCase {
    pub fn new(method: DivinationMethod, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            title: title.into(),
            question: None,
            payload: serde_json::Value::Null,
            hexagram_id: None,
            notes: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_hexagram(mut self, hexagram_id: i64) -> Self {
        self.hexagram_id = Some(hexagram_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Bumps `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for DivinationCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Method: {}", self.method)?;
        writeln!(f, "Created: {}", self.created_at.format("%Y-%m-%d %H:%M"))?;

        if let Some(question) = &self.question {
            writeln!(f, "Question: {}", question)?;
        }
        if let Some(hexagram_id) = self.hexagram_id {
            writeln!(f, "Hexagram: {}", hexagram_id)?;
        }
        if !self.tags.is_empty() {
            writeln!(f, "Tags: {}", self.tags.join(", "))?;
        }
        if let Some(notes) = &self.notes {
            writeln!(f, "\nNotes:\n{}", notes)?;
        }

        Ok(())
    }
}

impl Entity for DivinationCase {
    type Id = String;
    const TABLE: &'static str = "cases";
    const TRACK_CHANGES: bool = true;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn to_row(&self) -> Row {
        Row::with_capacity(10)
            .with("id", self.id.as_str())
            .with("method", self.method.to_string())
            .with("title", self.title.as_str())
            .with("question", self.question.clone())
            .with("payload", json_text(&self.payload))
            .with("hexagram_id", self.hexagram_id)
            .with("notes", self.notes.clone())
            .with("tags", json_text(&self.tags))
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        let method = row.text("method")?;
        Ok(Self {
            id: row.text("id")?,
            method: method
                .parse()
                .map_err(|e: String| MappingError::invalid("method", e))?,
            title: row.text("title")?,
            question: row.opt_text("question")?,
            payload: row.json("payload")?,
            hexagram_id: row.opt_i64("hexagram_id")?,
            notes: row.opt_text("notes")?,
            tags: row.json("tags")?,
            created_at: row.timestamp("created_at")?,
            updated_at: row.timestamp("updated_at")?,
        })
    }
}
