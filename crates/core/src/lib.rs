//! # nearstore-core
//!
//! Embeddable approximate nearest neighbor engine: a single-layer proximity
//! graph over raw or scalar-quantized vectors, build-once indices, mutable
//! document collections, and a directory-based persistent catalog.
//!
//! This is the core library crate with no async dependencies. The `nearstore`
//! binary in `crates/cli` wires it to a storage root from the command line.

/// Graph construction and beam search.
pub mod ann;
/// Name registry over one storage root.
pub mod catalog;
/// Mutable document collections with an embedded graph.
pub mod collection;
/// Global configuration constants: limits, defaults, and on-disk names.
pub mod config;
/// Distance metrics and f32 kernels.
pub mod distance;
/// Core document types: `Document`, `DocumentId`, and `MetadataValue`.
pub mod document;
/// Crate error taxonomy.
pub mod error;
/// Per-call worker pools for batch queries.
pub mod executor;
/// Filter types used by collection queries and deletes.
pub mod filter_types;
/// Build-once index handles.
pub mod index;
/// Creation parameters and their enums.
pub mod params;
/// Vector codecs: raw storage and 8/4-bit scalar quantization.
pub mod quantization;
/// Persisted schema descriptor.
pub mod schema;
/// Search primitives: result types and metadata filtering.
pub mod search;
/// Directory persistence with atomic saves.
pub mod storage;
/// Typed input batches.
pub mod vector;

pub use catalog::{Catalog, CatalogEntry};
pub use collection::{BatchReport, Collection, ItemOutcome, ItemStatus};
pub use distance::DistanceMetric;
pub use document::{Document, DocumentId, MetadataValue};
pub use error::{Error, Result};
pub use filter_types::FilterClause;
pub use index::Index;
pub use params::{DataType, IdType, IndexParams, IndexType, QuantizationType};
pub use schema::{HandleKind, IndexSchema};
pub use search::{Neighbor, QueryHit};
pub use vector::VectorBatch;
