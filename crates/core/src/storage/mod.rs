//! Storage layer: directory persistence for indices and collections.
//!
//! Every saved handle is a directory of a JSON schema plus CRC-checked
//! bincode blocks, replaced atomically (staging directory + rename) on save.

/// Disk persistence: schema and block save/load with atomic directory swaps.
pub mod persistence;

pub use persistence::{load_collection, load_index, read_schema, recover, save_collection, save_index};
