//! Wire models for the notes backend.
//!
//! Field names follow the backend's JSON. Tags travel as a comma-separated
//! string on the wire but are held as a list here; [`Tags`] accepts either
//! shape (and a JSON array encoded inside a string) when decoding.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const TITLE_MAX_CHARS: usize = 200;
pub const CATEGORY_MAX_CHARS: usize = 100;
pub const TAGS_MAX_CHARS: usize = 500;
pub const QUERY_MAX_CHARS: usize = 100;
pub const DEFAULT_MODEL: &str = "Qwen3-Next-80B-A3B-Instruct";

// =============================================================================
// VALIDATION ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoteError {
    /// Every rule the input violated, in check order.
    #[error("invalid note: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

// =============================================================================
// TAGS
// =============================================================================

/// Normalized tag list: trimmed, no empty entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<String>);

impl Tags {
    /// Parse a comma-separated string, or a JSON array encoded as a string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let txt = raw.trim();
        if txt.starts_with('[') && txt.ends_with(']') {
            if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(txt) {
                return Self::from_values(&items);
            }
        }
        Self::from_iter(txt.split(','))
    }

    fn from_values(items: &[serde_json::Value]) -> Self {
        Self::from_iter(items.iter().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire form: entries joined with `", "`.
    #[must_use]
    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|t| t.as_ref().trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl Serialize for Tags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.joined())
    }
}

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            List(Vec<serde_json::Value>),
            Null(()),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self::parse(&s),
            Raw::List(items) => Self::from_values(&items),
            Raw::Null(()) => Self::default(),
        })
    }
}

// =============================================================================
// NOTES
// =============================================================================

/// A stored note. List endpoints omit `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Fields a user edits when creating or updating a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Tags,
}

impl NoteDraft {
    /// Check the backend's field limits before sending.
    ///
    /// # Errors
    ///
    /// Returns [`NoteError::Invalid`] listing every violated rule.
    pub fn validate(&self) -> Result<(), NoteError> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("标题不能为空".to_owned());
        } else if self.title.chars().count() > TITLE_MAX_CHARS {
            errors.push(format!("标题长度不能超过{TITLE_MAX_CHARS}字符"));
        }
        if self.content.trim().is_empty() {
            errors.push("内容不能为空".to_owned());
        }
        if self.category.chars().count() > CATEGORY_MAX_CHARS {
            errors.push(format!("分类长度不能超过{CATEGORY_MAX_CHARS}字符"));
        }
        if self.tags.joined().chars().count() > TAGS_MAX_CHARS {
            errors.push(format!("标签总长度不能超过{TAGS_MAX_CHARS}字符"));
        }

        if errors.is_empty() { Ok(()) } else { Err(NoteError::Invalid(errors)) }
    }
}

/// Body of `PUT /note`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteUpdate<'a> {
    pub id: i64,
    #[serde(flatten)]
    pub draft: &'a NoteDraft,
}

/// Check a search query before issuing `/search`.
///
/// # Errors
///
/// Returns [`NoteError::Invalid`] when the query is blank or too long.
pub fn validate_search_query(query: &str) -> Result<(), NoteError> {
    if query.trim().is_empty() {
        return Err(NoteError::Invalid(vec!["搜索关键词不能为空".to_owned()]));
    }
    if query.chars().count() > QUERY_MAX_CHARS {
        return Err(NoteError::Invalid(vec![format!("搜索关键词长度不能超过{QUERY_MAX_CHARS}字符")]));
    }
    Ok(())
}

// =============================================================================
// SESSION
// =============================================================================

/// Body of `POST /login`: the AI endpoint the backend should use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}

/// Response of `GET /config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub default_model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(default)]
    pub id: Option<i64>,
}

// =============================================================================
// STATS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountEntry {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub categories: Vec<CountEntry>,
    #[serde(default)]
    pub tags: Vec<CountEntry>,
}

// =============================================================================
// AI OPTIMIZE
// =============================================================================

/// Body of `POST /optimize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizeRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Knowledge graph returned alongside an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<serde_json::Value>,
    #[serde(default)]
    pub edges: Vec<serde_json::Value>,
}

/// Response of `POST /optimize`. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OptimizeResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub optimized: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// `None` when absent, null, or an empty string. An empty list is kept.
    #[serde(default, deserialize_with = "optimize_tags")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub key_points: Option<Vec<String>>,
    #[serde(default)]
    pub graph: Option<Graph>,
    #[serde(default)]
    pub mode: Option<String>,
}

fn optimize_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Tags>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(Tags::parse(&s)),
        Some(serde_json::Value::Array(items)) => Some(Tags::from_values(&items)),
        Some(other) => Some(Tags::from_values(&[other])),
    })
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
