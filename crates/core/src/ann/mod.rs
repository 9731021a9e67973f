//! Graph-based approximate nearest neighbor index: arena layout, incremental
//! construction with diversity pruning, and beam search.

/// Arena-backed proximity graph and configuration.
pub mod graph;
/// Incremental insertion, neighbor selection, and connectivity repair.
pub mod insert;
/// Beam search with optional predicate filtering.
pub mod search;
/// Epoch-stamped visited marks for traversal.
pub mod visited;

pub use graph::{GraphConfig, GraphIndex};
pub use insert::build;
pub use search::{knn_search, knn_search_filtered};
pub use visited::VisitedSet;
