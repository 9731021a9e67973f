//! The persisted schema descriptor (`schema.json`).
//!
//! Written once per save next to the binary blocks it describes; read and
//! cross-checked against those blocks on load.

use crate::config;
use crate::params::IndexParams;
use serde::{Deserialize, Serialize};

/// Whether a saved directory holds a bare index or a document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Index,
    Collection,
}

impl HandleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleKind::Index => "index",
            HandleKind::Collection => "collection",
        }
    }
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One binary block of a saved handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// File name relative to the handle directory.
    pub file: String,
    pub bytes: u64,
    pub crc32: u32,
}

/// Immutable metadata of a saved index or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub format_version: u32,
    pub name: String,
    pub kind: HandleKind,
    /// `None` only for a collection that has never accepted a document.
    pub dimension: Option<usize>,
    #[serde(flatten)]
    pub params: IndexParams,
    /// Live vectors (index) or documents (collection).
    pub count: u64,
    /// Graph nodes including tombstones.
    pub node_count: u64,
    pub deleted_count: u64,
    #[serde(default)]
    pub blocks: Vec<BlockInfo>,
}

impl IndexSchema {
    pub fn new(name: &str, kind: HandleKind, params: &IndexParams) -> Self {
        Self {
            format_version: config::FORMAT_VERSION,
            name: name.to_string(),
            kind,
            dimension: None,
            params: params.clone(),
            count: 0,
            node_count: 0,
            deleted_count: 0,
            blocks: Vec::new(),
        }
    }

    pub fn block(&self, file: &str) -> Option<&BlockInfo> {
        self.blocks.iter().find(|b| b.file == file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::QuantizationType;

    #[test]
    fn test_schema_json_is_flat() {
        let params = IndexParams::default().with_quantization(QuantizationType::Sq8);
        let mut schema = IndexSchema::new("coll", HandleKind::Collection, &params);
        schema.dimension = Some(3);
        schema.count = 2;
        schema.blocks.push(BlockInfo {
            file: config::GRAPH_FILE.to_string(),
            bytes: 10,
            crc32: 0xdead_beef,
        });

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["kind"], "collection");
        assert_eq!(json["quantization_type"], "sq8");
        assert_eq!(json["max_nbrs"], 32);
        assert_eq!(json["dimension"], 3);

        let back: IndexSchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
        assert_eq!(back.block(config::GRAPH_FILE).unwrap().bytes, 10);
        assert!(back.block(config::DOCUMENTS_FILE).is_none());
    }
}
