//! Core document types for nearstore collections.
//!
//! A [`Document`] is a stored record with a caller-supplied [`DocumentId`],
//! free text, its embedding vector, and typed key-value metadata used by
//! filter predicates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Caller-supplied document identifier, unique within a collection.
///
/// Uses the default externally-tagged serde representation so the value
/// round-trips through bincode. JSON boundaries use [`DocumentId::to_json`]
/// and [`DocumentId::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentId {
    Int(i64),
    Text(String),
}

impl DocumentId {
    /// Plain JSON form: a number or a string.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DocumentId::Int(i) => serde_json::Value::from(*i),
            DocumentId::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }

    /// Accepts integer numbers and strings; anything else is `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(DocumentId::Int),
            serde_json::Value::String(s) => Some(DocumentId::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for DocumentId {
    fn from(id: i64) -> Self {
        DocumentId::Int(id)
    }
}

impl From<i32> for DocumentId {
    fn from(id: i32) -> Self {
        DocumentId::Int(id as i64)
    }
}

impl From<u32> for DocumentId {
    fn from(id: u32) -> Self {
        DocumentId::Int(id as i64)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId::Text(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId::Text(id)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{i}"),
            DocumentId::Text(s) => f.write_str(s),
        }
    }
}

/// A typed metadata value attached to a document.
///
/// Uses the default externally-tagged serde representation for bincode compatibility.
/// JSON callers convert with [`MetadataValue::from_json`] / [`MetadataValue::to_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Boolean value (`true` / `false`).
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating-point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// List of scalar values. Equality filters match on membership.
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Convert an untagged JSON value. Objects and `null` have no metadata form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(MetadataValue::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(MetadataValue::Integer(i)),
                None => n.as_f64().map(MetadataValue::Float),
            },
            serde_json::Value::String(s) => Some(MetadataValue::String(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(MetadataValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(MetadataValue::List),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetadataValue::Boolean(b) => serde_json::Value::Bool(*b),
            MetadataValue::Integer(i) => serde_json::Value::from(*i),
            MetadataValue::Float(f) => serde_json::Value::from(*f),
            MetadataValue::String(s) => serde_json::Value::from(s.as_str()),
            MetadataValue::List(items) => {
                serde_json::Value::Array(items.iter().map(MetadataValue::to_json).collect())
            }
        }
    }
}

/// A stored document: id, free text, embedding, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-supplied id, unique within the collection.
    pub id: DocumentId,
    pub text: String,
    /// Embedding as supplied by the caller (before any metric normalization).
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, MetadataValue>,
}

impl Document {
    /// Creates a document without metadata.
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            vector,
            metadata: HashMap::new(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// JSON rendering used by the command-line tool.
    pub fn to_json(&self) -> serde_json::Value {
        let metadata: serde_json::Map<String, serde_json::Value> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::json!({
            "id": self.id.to_json(),
            "text": self.text,
            "vector": self.vector,
            "metadata": metadata,
        })
    }
}
