//! Build-once ANN index handle.
//!
//! An [`Index`] owns one codec and one graph behind a shared lock. It is
//! created empty, built exactly once with [`Index::fit`], and read-only after
//! that: queries only ever take the read lock.

use crate::ann::{self, GraphConfig, GraphIndex};
use crate::config;
use crate::error::{Error, Result};
use crate::executor;
use crate::params::{self, IndexParams};
use crate::schema::{HandleKind, IndexSchema};
use crate::search::Neighbor;
use crate::vector::VectorBatch;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// State behind an [`Index`] handle.
#[derive(Debug)]
pub struct IndexData {
    pub name: String,
    pub params: IndexParams,
    /// `None` until the first successful `fit`.
    pub graph: Option<GraphIndex>,
}

/// A named, immutable-after-build vector index.
///
/// Cloning produces another handle to the same shared data.
#[derive(Debug, Clone)]
pub struct Index {
    pub data: Arc<RwLock<IndexData>>,
}

impl Index {
    /// Creates an unbuilt index. Fails on invalid names or parameters.
    pub fn new(name: &str, params: IndexParams) -> Result<Self> {
        params::validate_name(name)?;
        params.validate()?;
        Ok(Self {
            data: Arc::new(RwLock::new(IndexData {
                name: name.to_string(),
                params,
                graph: None,
            })),
        })
    }

    /// Wraps a graph restored from disk.
    pub(crate) fn from_parts(name: String, params: IndexParams, graph: GraphIndex) -> Self {
        Self {
            data: Arc::new(RwLock::new(IndexData {
                name,
                params,
                graph: Some(graph),
            })),
        }
    }

    /// Build the graph over `vectors`, in input order.
    ///
    /// The element type and dimension are checked before any graph work. A
    /// failed build leaves the index unbuilt; a second build fails with
    /// [`Error::State`] and leaves the first build untouched.
    pub fn fit(&self, vectors: impl Into<VectorBatch>) -> Result<()> {
        let batch = vectors.into();
        let (name, params) = {
            let data = self.data.read();
            if data.graph.is_some() {
                return Err(already_built(&data.name));
            }
            (data.name.clone(), data.params.clone())
        };

        if batch.data_type() != params.data_type {
            return Err(Error::Validation(format!(
                "index '{}' expects {} vectors, got {}",
                name,
                params.data_type,
                batch.data_type()
            )));
        }
        let dimension = batch.dimension()?;
        if batch.len() > u32::MAX as usize {
            return Err(Error::Validation(format!(
                "{} vectors exceed the node id space",
                batch.len()
            )));
        }

        let mut rows = batch.into_f32();
        for row in rows.iter_mut() {
            params.metric.prepare(row);
        }

        let mut data = self.data.write();
        // Re-check under the write lock: another handle may have built meanwhile.
        if data.graph.is_some() {
            return Err(already_built(&data.name));
        }

        let start = Instant::now();
        let graph = ann::build(
            GraphConfig::from(&params),
            params.quantization_type,
            dimension,
            &rows,
        )?;
        tracing::info!(
            index = %name,
            nodes = graph.node_count,
            dimension,
            quantization = %params.quantization_type,
            index_type = %params.index_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index built"
        );
        data.graph = Some(graph);
        Ok(())
    }

    /// Top-`limit` neighbors of one query vector.
    pub fn query(&self, vector: &[f32], limit: usize, ef_search: usize) -> Result<Vec<Neighbor>> {
        let data = self.data.read();
        let graph = built_graph(&data)?;
        check_search_args(limit, ef_search)?;
        check_query(graph.dimension, vector)?;
        Ok(search_one(graph, vector, limit, ef_search))
    }

    /// One result list per query, in input order, on `num_threads` workers.
    pub fn batch_query(
        &self,
        queries: &[Vec<f32>],
        limit: usize,
        ef_search: usize,
        num_threads: usize,
    ) -> Result<Vec<Vec<Neighbor>>> {
        let data = self.data.read();
        let graph = built_graph(&data)?;
        check_search_args(limit, ef_search)?;
        executor::validate_threads(num_threads)?;
        for q in queries {
            check_query(graph.dimension, q)?;
        }
        executor::run_batch(queries, num_threads, |q| {
            search_one(graph, q, limit, ef_search)
        })
    }

    /// The stored vector for an internal id: exact in raw mode, dequantized
    /// otherwise. Cosine indices return the normalized vector.
    pub fn get_vector(&self, id: u64) -> Result<Vec<f32>> {
        let data = self.data.read();
        let graph = built_graph(&data)?;
        u32::try_from(id)
            .ok()
            .and_then(|id| graph.vector(id))
            .ok_or_else(|| Error::NotFound(format!("vector id {id} in index '{}'", data.name)))
    }

    pub fn name(&self) -> String {
        self.data.read().name.clone()
    }

    pub fn params(&self) -> IndexParams {
        self.data.read().params.clone()
    }

    pub fn is_built(&self) -> bool {
        self.data.read().graph.is_some()
    }

    /// Number of indexed vectors (0 before the build).
    pub fn len(&self) -> usize {
        self.data.read().graph.as_ref().map_or(0, GraphIndex::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.data.read().graph.as_ref().map(|g| g.dimension)
    }

    /// The descriptor a save would write, without block checksums.
    pub fn schema(&self) -> IndexSchema {
        self.data.read().describe()
    }

    /// Persist to `dir` with an atomic directory swap. See [`crate::storage::save_index`].
    pub fn save(&self, dir: &std::path::Path) -> Result<IndexSchema> {
        crate::storage::save_index(self, dir)
    }
}

impl IndexData {
    pub(crate) fn describe(&self) -> IndexSchema {
        let mut schema = IndexSchema::new(&self.name, HandleKind::Index, &self.params);
        if let Some(graph) = &self.graph {
            schema.dimension = Some(graph.dimension);
            schema.count = graph.len() as u64;
            schema.node_count = graph.node_count as u64;
            schema.deleted_count = graph.deleted_count() as u64;
        }
        schema
    }
}

fn already_built(name: &str) -> Error {
    Error::State(format!("index '{name}' is already built"))
}

fn built_graph(data: &IndexData) -> Result<&GraphIndex> {
    data.graph
        .as_ref()
        .ok_or_else(|| Error::State(format!("index '{}' has not been built", data.name)))
}

fn search_one(graph: &GraphIndex, vector: &[f32], limit: usize, ef_search: usize) -> Vec<Neighbor> {
    let query = graph.config.metric.prepared(vector);
    ann::knn_search(graph, &query, limit, ef_search)
        .into_iter()
        .map(|(distance, id)| Neighbor {
            id: id as u64,
            distance,
        })
        .collect()
}

/// Range checks shared by index and collection queries.
pub(crate) fn check_search_args(limit: usize, ef_search: usize) -> Result<()> {
    if limit == 0 || limit > config::MAX_K {
        return Err(Error::Validation(format!(
            "limit {limit} out of range [1, {}]",
            config::MAX_K
        )));
    }
    if ef_search < limit {
        return Err(Error::Validation(format!(
            "ef_search {ef_search} is smaller than limit {limit}"
        )));
    }
    if ef_search > config::MAX_EF_SEARCH {
        return Err(Error::Validation(format!(
            "ef_search {ef_search} exceeds {}",
            config::MAX_EF_SEARCH
        )));
    }
    Ok(())
}

pub(crate) fn check_query(dimension: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::Validation(format!(
            "query dimension {} does not match {}",
            vector.len(),
            dimension
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::Validation(
            "query contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::params::{DataType, IndexType, QuantizationType};

    fn line(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![i as f32, (i % 3) as f32]).collect()
    }

    #[test]
    fn test_fit_then_query() {
        let index = Index::new("points", IndexParams::default().with_max_nbrs(8)).unwrap();
        assert!(!index.is_built());
        index.fit(line(50)).unwrap();
        assert!(index.is_built());
        assert_eq!(index.len(), 50);
        assert_eq!(index.dimension(), Some(2));

        let hits = index.query(&[10.0, 1.0], 3, 16).unwrap();
        assert_eq!(hits[0].id, 10);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_second_fit_is_state_error() {
        let index = Index::new("once", IndexParams::default()).unwrap();
        index.fit(line(20)).unwrap();
        let before = index.query(&[5.0, 2.0], 5, 10).unwrap();

        let err = index.fit(line(30)).unwrap_err();
        assert!(matches!(err, Error::State(_)));
        assert_eq!(index.len(), 20);
        assert_eq!(index.query(&[5.0, 2.0], 5, 10).unwrap(), before);
    }

    #[test]
    fn test_query_before_fit_is_state_error() {
        let index = Index::new("empty", IndexParams::default()).unwrap();
        assert!(matches!(index.query(&[1.0], 1, 1), Err(Error::State(_))));
        assert!(matches!(index.get_vector(0), Err(Error::State(_))));
    }

    #[test]
    fn test_data_type_mismatch_leaves_unbuilt() {
        let params = IndexParams::default().with_data_type(DataType::Uint8);
        let index = Index::new("bytes", params).unwrap();
        let err = index.fit(line(10)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!index.is_built());

        index.fit(vec![vec![1u8, 2], vec![3, 4]]).unwrap();
        assert_eq!(index.get_vector(1).unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_invalid_creation() {
        assert!(matches!(
            Index::new("big", IndexParams::default().with_max_nbrs(1000)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            Index::new("", IndexParams::default()),
            Err(Error::Configuration(_))
        ));
        let fusion_raw = IndexParams::default().with_index_type(IndexType::Fusion);
        assert!(Index::new("f", fusion_raw).is_err());
    }

    #[test]
    fn test_query_argument_checks() {
        let index = Index::new("args", IndexParams::default()).unwrap();
        index.fit(line(10)).unwrap();
        assert!(matches!(index.query(&[1.0, 1.0], 0, 10), Err(Error::Validation(_))));
        assert!(matches!(index.query(&[1.0, 1.0], 5, 4), Err(Error::Validation(_))));
        assert!(matches!(index.query(&[1.0], 1, 10), Err(Error::Validation(_))));
        assert!(matches!(
            index.query(&[f32::NAN, 1.0], 1, 10),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            index.batch_query(&[vec![1.0, 1.0]], 1, 10, 0),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_batch_query_matches_single_queries() {
        let params = IndexParams::default()
            .with_metric(DistanceMetric::Cos)
            .with_quantization(QuantizationType::Sq8)
            .with_max_nbrs(8);
        let index = Index::new("batch", params).unwrap();
        let rows: Vec<Vec<f32>> = (0..80)
            .map(|i| vec![1.0 + i as f32, (i * 7 % 11) as f32, 3.0])
            .collect();
        index.fit(rows.clone()).unwrap();

        let queries: Vec<Vec<f32>> = rows.iter().step_by(9).cloned().collect();
        let batched = index.batch_query(&queries, 4, 20, 3).unwrap();
        assert_eq!(batched.len(), queries.len());
        for (q, hits) in queries.iter().zip(&batched) {
            assert_eq!(&index.query(q, 4, 20).unwrap(), hits);
        }
    }

    #[test]
    fn test_get_vector_out_of_range() {
        let index = Index::new("v", IndexParams::default()).unwrap();
        index.fit(line(4)).unwrap();
        assert_eq!(index.get_vector(2).unwrap(), vec![2.0, 2.0]);
        assert!(matches!(index.get_vector(4), Err(Error::NotFound(_))));
        assert!(matches!(index.get_vector(u64::MAX), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_schema_reflects_build() {
        let index = Index::new("s", IndexParams::default()).unwrap();
        assert_eq!(index.schema().dimension, None);
        index.fit(line(7)).unwrap();
        let schema = index.schema();
        assert_eq!(schema.kind, HandleKind::Index);
        assert_eq!(schema.dimension, Some(2));
        assert_eq!(schema.count, 7);
        assert_eq!(schema.node_count, 7);
    }
}
