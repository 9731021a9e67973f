//! Result types returned by index and collection queries.

use crate::document::Document;
use serde::Serialize;
use std::sync::Arc;

/// One ranked hit from an index query.
///
/// `distance` follows the index metric, lower is closer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    /// Node id in insertion order of the build corpus.
    pub id: u64,
    pub distance: f32,
}

/// One ranked hit from a collection query: the stored document plus its distance.
#[derive(Debug, Clone)]
pub struct QueryHit {
    /// The matched document (shared reference).
    pub document: Arc<Document>,
    pub distance: f32,
}

impl QueryHit {
    /// JSON rendering with the document fields flattened next to `distance`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = self.document.to_json();
        if let Some(obj) = value.as_object_mut() {
            obj.insert("distance".to_string(), serde_json::Value::from(self.distance));
        }
        value
    }
}
