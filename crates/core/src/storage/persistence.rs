//! Directory persistence for indices and collections.
//!
//! A saved handle is one directory holding `schema.json` plus bincode blocks
//! (`graph.bin`, and `documents.bin` for collections). The schema records the
//! byte size and CRC32 of every block; both are verified before a block is
//! decoded. Saves are written into a hidden staging directory and swapped into
//! place with two renames, so a failed or interrupted save never damages the
//! previous one.

use crate::ann::GraphIndex;
use crate::collection::{Collection, CollectionData};
use crate::config;
use crate::document::{Document, DocumentId};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::params::IdType;
use crate::schema::{BlockInfo, HandleKind, IndexSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collection documents in node order. Tombstoned nodes have no document.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentsBlock {
    internal_to_id: Vec<Option<DocumentId>>,
    documents: Vec<Arc<Document>>,
}

/// Serialize `value` into `dir/file`, returning its block descriptor.
pub fn write_block<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<BlockInfo> {
    let bytes = bincode::serialize(value).map_err(|e| Error::Io(io::Error::other(e)))?;
    let crc32 = crc32fast::hash(&bytes);
    fs::write(dir.join(file), &bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir.join(file), fs::Permissions::from_mode(0o600))?;
    }
    Ok(BlockInfo {
        file: file.to_string(),
        bytes: bytes.len() as u64,
        crc32,
    })
}

/// Read and decode a block after checking its size and CRC32.
pub fn read_block<T: DeserializeOwned>(dir: &Path, info: &BlockInfo) -> Result<T> {
    let path = dir.join(&info.file);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::Corruption(format!("missing block {:?}", path)));
        }
        Err(e) => return Err(e.into()),
    };
    if bytes.len() as u64 != info.bytes {
        return Err(Error::Corruption(format!(
            "block {:?} is {} bytes, schema records {}",
            path,
            bytes.len(),
            info.bytes
        )));
    }
    let crc = crc32fast::hash(&bytes);
    if crc != info.crc32 {
        return Err(Error::Corruption(format!(
            "block {:?} CRC32 mismatch: expected {:#010x}, got {:#010x}",
            path, info.crc32, crc
        )));
    }
    tracing::debug!(block = %info.file, crc32 = crc, "block checksum verified");
    bincode::deserialize(&bytes)
        .map_err(|e| Error::Corruption(format!("block {:?} failed to decode: {}", path, e)))
}

/// Read and sanity-check the descriptor of a saved handle.
pub fn read_schema(dir: &Path) -> Result<IndexSchema> {
    if !dir.is_dir() {
        return Err(Error::NotFound(format!("directory {:?}", dir)));
    }
    let path = dir.join(config::SCHEMA_FILE);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!("no {} in {:?}", config::SCHEMA_FILE, dir)));
        }
        Err(e) => return Err(e.into()),
    };
    let schema: IndexSchema = serde_json::from_slice(&raw)
        .map_err(|e| Error::Corruption(format!("unreadable schema {:?}: {}", path, e)))?;
    if schema.format_version != config::FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "schema {:?} has format version {}, expected {}",
            path,
            schema.format_version,
            config::FORMAT_VERSION
        )));
    }
    schema
        .params
        .validate()
        .map_err(|e| Error::Corruption(format!("schema {:?}: {}", path, e)))?;
    if schema.params.id_type == IdType::Uint32 && schema.node_count > u32::MAX as u64 {
        return Err(Error::Corruption(format!(
            "schema {:?} records {} nodes for 32-bit ids",
            path, schema.node_count
        )));
    }
    Ok(schema)
}

fn required_block<'a>(schema: &'a IndexSchema, file: &str) -> Result<&'a BlockInfo> {
    schema.block(file).ok_or_else(|| {
        Error::Corruption(format!("schema of '{}' lists no {} block", schema.name, file))
    })
}

fn expect_kind(schema: &IndexSchema, kind: HandleKind) -> Result<()> {
    if schema.kind != kind {
        return Err(Error::Corruption(format!(
            "'{}' holds a {}, not a {}",
            schema.name, schema.kind, kind
        )));
    }
    Ok(())
}

/// Cross-check a decoded graph against the descriptor that announced it.
fn check_graph(schema: &IndexSchema, graph: &GraphIndex) -> Result<()> {
    graph
        .validate()
        .map_err(|e| Error::Corruption(format!("graph of '{}': {}", schema.name, e)))?;

    let params = &schema.params;
    let mismatch = if schema.dimension != Some(graph.dimension) {
        Some(format!("dimension {:?} vs {}", schema.dimension, graph.dimension))
    } else if schema.node_count != graph.node_count as u64 {
        Some(format!("node_count {} vs {}", schema.node_count, graph.node_count))
    } else if schema.deleted_count != graph.deleted_count() as u64 {
        Some(format!(
            "deleted_count {} vs {}",
            schema.deleted_count,
            graph.deleted_count()
        ))
    } else if params.metric != graph.config.metric {
        Some(format!("metric {} vs {}", params.metric, graph.config.metric))
    } else if params.quantization_type != graph.codec.quantization_type() {
        Some(format!(
            "quantization {} vs {}",
            params.quantization_type,
            graph.codec.quantization_type()
        ))
    } else if params.index_type != graph.config.index_type {
        Some(format!("index_type {} vs {}", params.index_type, graph.config.index_type))
    } else if params.max_nbrs != graph.config.max_nbrs {
        Some(format!("max_nbrs {} vs {}", params.max_nbrs, graph.config.max_nbrs))
    } else {
        None
    };
    match mismatch {
        Some(detail) => Err(Error::Corruption(format!(
            "schema of '{}' disagrees with its graph: {}",
            schema.name, detail
        ))),
        None => Ok(()),
    }
}

/// Write a handle directory through a staging directory and swap it into place.
///
/// `write` fills the staging directory with blocks and returns the schema to
/// record; the schema file is written last.
fn save_atomically<F>(target: &Path, write: F) -> Result<IndexSchema>
where
    F: FnOnce(&Path) -> Result<IndexSchema>,
{
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("invalid save directory {:?}", target)))?;
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let token = uuid::Uuid::new_v4().simple().to_string();
    let staging = parent.join(format!("{}{}.{}", config::STAGING_PREFIX, name, token));
    let backup = parent.join(format!("{}{}.{}", config::BACKUP_PREFIX, name, token));

    fs::create_dir_all(&staging)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&staging, fs::Permissions::from_mode(0o700));
    }

    let staged = write(&staging).and_then(|schema| {
        let json = serde_json::to_vec_pretty(&schema).map_err(|e| Error::Io(io::Error::other(e)))?;
        fs::write(staging.join(config::SCHEMA_FILE), json)?;
        Ok(schema)
    });
    let schema = match staged {
        Ok(schema) => schema,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };

    if let Err(e) = swap_into_place(&staging, target, &backup) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e.into());
    }
    Ok(schema)
}

/// Replace `target` with `staging`, parking any previous `target` at `backup`
/// until the new directory is in place.
///
/// On failure the previous directory is moved back. Once the new directory
/// is live the call succeeds even if the backup cannot be removed;
/// [`recover`] clears it later.
fn swap_into_place(staging: &Path, target: &Path, backup: &Path) -> io::Result<()> {
    let had_previous = target.exists();
    if had_previous {
        fs::rename(target, backup)?;
    }
    if let Err(e) = fs::rename(staging, target) {
        if had_previous {
            if let Err(rollback) = fs::rename(backup, target) {
                tracing::error!(
                    backup = %backup.display(),
                    target = %target.display(),
                    error = %rollback,
                    "failed to restore previous save, recovery required"
                );
            }
        }
        return Err(e);
    }
    if had_previous {
        if let Err(e) = fs::remove_dir_all(backup) {
            tracing::warn!(
                backup = %backup.display(),
                error = %e,
                "save committed but backup removal failed"
            );
        }
    }
    Ok(())
}

/// Save a built index into `dir`, replacing any previous save there.
pub fn save_index(index: &Index, dir: &Path) -> Result<IndexSchema> {
    let data = index.data.read();
    let graph = data
        .graph
        .as_ref()
        .ok_or_else(|| Error::State(format!("index '{}' has not been built", data.name)))?;

    let schema = save_atomically(dir, |staging| {
        let mut schema = data.describe();
        schema.blocks.push(write_block(staging, config::GRAPH_FILE, graph)?);
        Ok(schema)
    })?;

    tracing::info!(
        index = %schema.name,
        nodes = schema.node_count,
        bytes = schema.blocks.iter().map(|b| b.bytes).sum::<u64>(),
        path = %dir.display(),
        "index saved"
    );
    Ok(schema)
}

/// Load an index saved by [`save_index`].
pub fn load_index(dir: &Path) -> Result<Index> {
    let schema = read_schema(dir)?;
    expect_kind(&schema, HandleKind::Index)?;
    let graph: GraphIndex = read_block(dir, required_block(&schema, config::GRAPH_FILE)?)?;
    check_graph(&schema, &graph)?;
    if schema.count != graph.len() as u64 {
        return Err(Error::Corruption(format!(
            "schema of '{}' records {} vectors, graph holds {}",
            schema.name,
            schema.count,
            graph.len()
        )));
    }

    tracing::info!(index = %schema.name, nodes = graph.node_count, "index loaded");
    Ok(Index::from_parts(schema.name, schema.params, graph))
}

/// Save a collection into `dir`, replacing any previous save there.
///
/// A collection that has never accepted a document saves without a graph block.
pub fn save_collection(collection: &Collection, dir: &Path) -> Result<IndexSchema> {
    let data = collection.data.read();

    let schema = save_atomically(dir, |staging| {
        let mut schema = data.describe();
        if let Some(graph) = &data.graph {
            schema.blocks.push(write_block(staging, config::GRAPH_FILE, graph)?);
        }

        let block = DocumentsBlock {
            internal_to_id: data.internal_to_id.clone(),
            documents: data
                .internal_to_id
                .iter()
                .flatten()
                .filter_map(|id| data.documents.get(id).cloned())
                .collect(),
        };
        schema
            .blocks
            .push(write_block(staging, config::DOCUMENTS_FILE, &block)?);
        Ok(schema)
    })?;

    tracing::info!(
        collection = %schema.name,
        documents = schema.count,
        bytes = schema.blocks.iter().map(|b| b.bytes).sum::<u64>(),
        path = %dir.display(),
        "collection saved"
    );
    Ok(schema)
}

/// Load a collection saved by [`save_collection`].
pub fn load_collection(dir: &Path) -> Result<Collection> {
    let schema = read_schema(dir)?;
    expect_kind(&schema, HandleKind::Collection)?;

    let graph: Option<GraphIndex> = match schema.block(config::GRAPH_FILE) {
        Some(info) => {
            let graph: GraphIndex = read_block(dir, info)?;
            check_graph(&schema, &graph)?;
            Some(graph)
        }
        None if schema.node_count == 0 => None,
        None => {
            return Err(Error::Corruption(format!(
                "schema of '{}' records {} nodes but no graph block",
                schema.name, schema.node_count
            )))
        }
    };

    let block: DocumentsBlock = read_block(dir, required_block(&schema, config::DOCUMENTS_FILE)?)?;
    if block.documents.len() as u64 != schema.count {
        return Err(Error::Corruption(format!(
            "schema of '{}' records {} documents, block holds {}",
            schema.name,
            schema.count,
            block.documents.len()
        )));
    }

    let mut id_to_internal = HashMap::with_capacity(block.documents.len());
    for (internal, slot) in block.internal_to_id.iter().enumerate() {
        if let Some(id) = slot {
            if id_to_internal.insert(id.clone(), internal as u32).is_some() {
                return Err(Error::Corruption(format!(
                    "collection '{}' maps id {} to several nodes",
                    schema.name, id
                )));
            }
        }
    }
    let mut documents = HashMap::with_capacity(block.documents.len());
    for doc in block.documents {
        documents.insert(doc.id.clone(), doc);
    }

    let data = CollectionData {
        name: schema.name.clone(),
        params: schema.params.clone(),
        dimension: schema.dimension,
        documents,
        graph,
        id_to_internal,
        internal_to_id: block.internal_to_id,
    };
    data.validate()
        .map_err(|e| Error::Corruption(format!("collection '{}': {}", schema.name, e)))?;

    tracing::info!(
        collection = %schema.name,
        documents = data.documents.len(),
        "collection loaded"
    );
    Ok(Collection::from_data(data))
}

/// Clean up after saves interrupted between staging and swap.
///
/// Stale staging directories are removed. A backup whose target directory is
/// missing is renamed back into place; otherwise it is removed. Returns the
/// number of directories acted on.
pub fn recover(root: &Path) -> Result<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut acted = 0;
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let path = entry.path();

        if file_name.starts_with(config::STAGING_PREFIX) {
            fs::remove_dir_all(&path)?;
            tracing::debug!(path = %path.display(), "removed stale staging directory");
            acted += 1;
        } else if let Some(target) = backup_target(root, file_name) {
            if target.exists() {
                fs::remove_dir_all(&path)?;
                tracing::debug!(path = %path.display(), "removed stale backup directory");
            } else {
                fs::rename(&path, &target)?;
                tracing::info!(path = %target.display(), "restored interrupted save from backup");
            }
            acted += 1;
        }
    }
    Ok(acted)
}

/// Whether `file_name` names a save-in-progress directory.
pub fn is_transient(file_name: &str) -> bool {
    file_name.starts_with(config::STAGING_PREFIX) || file_name.starts_with(config::BACKUP_PREFIX)
}

/// `.backup-<name>.<token>` -> `<root>/<name>`.
fn backup_target(root: &Path, file_name: &str) -> Option<PathBuf> {
    let rest = file_name.strip_prefix(config::BACKUP_PREFIX)?;
    let (name, _token) = rest.rsplit_once('.')?;
    if name.is_empty() {
        return None;
    }
    Some(root.join(name))
}
