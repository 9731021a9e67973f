//! Mutable document collections.
//!
//! A [`Collection`] maps caller-supplied [`DocumentId`]s to stored documents
//! and keeps a proximity graph over their vectors in step with every insert,
//! upsert, and delete. Replaced and deleted documents leave tombstoned graph
//! nodes behind until [`Collection::reindex`] compacts them.

use crate::ann::{self, GraphConfig, GraphIndex, VisitedSet};
use crate::config;
use crate::document::{Document, DocumentId};
use crate::error::{Error, Result};
use crate::executor;
use crate::filter_types::FilterClause;
use crate::index::{check_query, check_search_args};
use crate::params::{self, IndexParams};
use crate::quantization::VectorCodec;
use crate::schema::{HandleKind, IndexSchema};
use crate::search::filter::matches_filter;
use crate::search::QueryHit;
use crate::vector;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one item of an insert or upsert batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ItemStatus {
    Inserted,
    Replaced,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub id: DocumentId,
    pub status: ItemStatus,
}

/// Per-item outcomes of a write batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    /// Number of items that were stored (inserted or replaced).
    pub fn accepted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.status, ItemStatus::Rejected(_)))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }

    pub fn all_accepted(&self) -> bool {
        self.rejected() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Upsert,
}

/// Internal data for a collection, protected by a `RwLock`.
///
/// Every live document has exactly one live graph node; `internal_to_id`
/// is indexed by node id and holds `None` for tombstones.
#[derive(Debug)]
pub struct CollectionData {
    pub name: String,
    pub params: IndexParams,
    /// Fixed at creation or by the first accepted document.
    pub dimension: Option<usize>,
    pub documents: HashMap<DocumentId, Arc<Document>>,
    /// `None` until the first document arrives (or after reindexing an empty collection).
    pub graph: Option<GraphIndex>,
    pub id_to_internal: HashMap<DocumentId, u32>,
    pub internal_to_id: Vec<Option<DocumentId>>,
}

impl CollectionData {
    pub fn new(name: String, params: IndexParams, dimension: Option<usize>) -> Self {
        Self {
            name,
            params,
            dimension,
            documents: HashMap::new(),
            graph: None,
            id_to_internal: HashMap::new(),
            internal_to_id: Vec::new(),
        }
    }

    /// Validate internal invariants after deserialization.
    ///
    /// Checks the graph against the collection parameters and that the id
    /// mappings, tombstones, and document map agree with each other.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let Some(graph) = &self.graph else {
            if !self.documents.is_empty() || !self.internal_to_id.is_empty() {
                return Err("documents present without a graph".to_string());
            }
            return Ok(());
        };
        graph.validate()?;

        if Some(graph.dimension) != self.dimension {
            return Err(format!(
                "graph dimension {} != collection dimension {:?}",
                graph.dimension, self.dimension
            ));
        }
        let nc = graph.node_count as usize;
        if self.internal_to_id.len() != nc {
            return Err(format!(
                "internal_to_id length {} != node_count {}",
                self.internal_to_id.len(),
                nc
            ));
        }
        if self.id_to_internal.len() != self.documents.len() {
            return Err(format!(
                "id_to_internal({}) != documents({})",
                self.id_to_internal.len(),
                self.documents.len()
            ));
        }
        for (internal, slot) in self.internal_to_id.iter().enumerate() {
            let live = !graph.deleted[internal];
            match slot {
                Some(id) if live => {
                    if self.id_to_internal.get(id) != Some(&(internal as u32)) {
                        return Err(format!("id mapping for node {internal} is not symmetric"));
                    }
                    match self.documents.get(id) {
                        Some(doc) if doc.vector.len() == graph.dimension => {}
                        Some(_) => return Err(format!("document at node {internal} has wrong dimension")),
                        None => return Err(format!("node {internal} has no document")),
                    }
                }
                None if !live => {}
                _ => {
                    return Err(format!(
                        "node {internal} tombstone flag disagrees with its id mapping"
                    ))
                }
            }
        }
        Ok(())
    }

    pub(crate) fn describe(&self) -> IndexSchema {
        let mut schema = IndexSchema::new(&self.name, HandleKind::Collection, &self.params);
        schema.dimension = self.dimension;
        schema.count = self.documents.len() as u64;
        if let Some(graph) = &self.graph {
            schema.node_count = graph.node_count as u64;
            schema.deleted_count = graph.deleted_count() as u64;
        }
        schema
    }

    fn document_at(&self, internal: u32) -> Option<&Arc<Document>> {
        self.internal_to_id
            .get(internal as usize)?
            .as_ref()
            .and_then(|id| self.documents.get(id))
    }

    /// Live documents in internal id (insertion) order.
    fn live_documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.internal_to_id
            .iter()
            .flatten()
            .filter_map(|id| self.documents.get(id))
    }

    /// Drop a document and tombstone its node.
    fn remove(&mut self, id: &DocumentId) -> bool {
        if self.documents.remove(id).is_none() {
            return false;
        }
        if let Some(internal) = self.id_to_internal.remove(id) {
            if let Some(slot) = self.internal_to_id.get_mut(internal as usize) {
                *slot = None;
            }
            if let Some(graph) = self.graph.as_mut() {
                graph.mark_deleted(internal);
            }
        }
        true
    }

    /// Why `doc` cannot be stored, if it cannot.
    fn check_document(&self, doc: &Document, dimension: Option<usize>) -> Option<String> {
        let len = doc.vector.len();
        match dimension {
            Some(d) if len != d => {
                return Some(format!("vector dimension {len} does not match {d}"));
            }
            None if len == 0 || len > config::MAX_DIMENSION => {
                return Some(format!(
                    "vector dimension {len} out of range [1, {}]",
                    config::MAX_DIMENSION
                ));
            }
            _ => {}
        }
        if !vector::admits(self.params.data_type, &doc.vector) {
            return Some(format!(
                "vector is not representable as {}",
                self.params.data_type
            ));
        }
        if self
            .graph
            .as_ref()
            .is_some_and(|g| g.node_count == u32::MAX)
        {
            return Some("node id space exhausted, reindex the collection".to_string());
        }
        None
    }

    fn write_batch(&mut self, documents: Vec<Document>, mode: WriteMode) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut dimension = self.dimension;
        let mut seen: HashSet<DocumentId> = HashSet::new();
        let mut accepted: Vec<(Document, Vec<f32>)> = Vec::new();

        for doc in documents {
            let rejection = if mode == WriteMode::Insert
                && (self.documents.contains_key(&doc.id) || seen.contains(&doc.id))
            {
                Some(format!("duplicate id {}", doc.id))
            } else {
                self.check_document(&doc, dimension)
            };
            if let Some(reason) = rejection {
                report.outcomes.push(ItemOutcome {
                    id: doc.id,
                    status: ItemStatus::Rejected(reason),
                });
                continue;
            }

            dimension = Some(doc.vector.len());
            let status = if self.documents.contains_key(&doc.id) || seen.contains(&doc.id) {
                ItemStatus::Replaced
            } else {
                ItemStatus::Inserted
            };
            seen.insert(doc.id.clone());
            report.outcomes.push(ItemOutcome {
                id: doc.id.clone(),
                status,
            });
            let prepared = self.params.metric.prepared(&doc.vector);
            accepted.push((doc, prepared));
        }

        let Some(dimension) = dimension else {
            return Ok(report);
        };
        if accepted.is_empty() {
            return Ok(report);
        }

        let out_of_range = self
            .graph
            .as_ref()
            .is_some_and(|g| accepted.iter().any(|(_, prepared)| !g.codec.covers(prepared)));
        if out_of_range {
            let incoming = accepted.into_iter().map(|(doc, _)| doc).collect();
            let (live, tombstones) = self.rebuild(incoming)?;
            tracing::info!(
                collection = %self.name,
                documents = live,
                tombstones,
                "batch outside the codec range, codec refit and graph rebuilt"
            );
            return Ok(report);
        }

        let fresh_graph = self.graph.is_none();
        if fresh_graph {
            let rows: Vec<Vec<f32>> = accepted.iter().map(|(_, p)| p.clone()).collect();
            let codec = VectorCodec::fit(self.params.quantization_type, dimension, &rows)?;
            self.graph = Some(GraphIndex::new(GraphConfig::from(&self.params), codec));
            self.dimension = Some(dimension);
        }

        let mut visited = VisitedSet::default();
        for (doc, prepared) in accepted {
            self.remove(&doc.id);
            let Some(graph) = self.graph.as_mut() else {
                break;
            };
            let internal = graph.insert(&prepared, &mut visited);
            self.id_to_internal.insert(doc.id.clone(), internal);
            self.internal_to_id.push(Some(doc.id.clone()));
            self.documents.insert(doc.id.clone(), Arc::new(doc));
        }

        if let Some(graph) = self.graph.as_mut() {
            if fresh_graph {
                graph.finalize(&mut visited);
            } else {
                graph.repair_connectivity(&mut visited);
            }
        }

        tracing::debug!(
            collection = %self.name,
            accepted = report.accepted(),
            rejected = report.rejected(),
            "write batch applied"
        );
        self.note_tombstones();
        Ok(report)
    }

    /// Rebuild the graph over the live documents followed by `incoming`,
    /// refitting the codec on all of them. A document in `incoming` replaces
    /// any stored document with the same id and moves to the end of the
    /// insertion order. Nothing changes if the build fails.
    ///
    /// Returns the live document count and the tombstones dropped.
    fn rebuild(&mut self, incoming: Vec<Document>) -> Result<(usize, usize)> {
        let tombstones = self.graph.as_ref().map_or(0, GraphIndex::deleted_count);
        let mut slots: Vec<Option<Arc<Document>>> = Vec::new();
        let mut position: HashMap<DocumentId, usize> = HashMap::new();
        let stored: Vec<Arc<Document>> = self.live_documents().cloned().collect();
        for doc in stored.into_iter().chain(incoming.into_iter().map(Arc::new)) {
            if let Some(prev) = position.insert(doc.id.clone(), slots.len()) {
                slots[prev] = None;
            }
            slots.push(Some(doc));
        }
        let docs: Vec<Arc<Document>> = slots.into_iter().flatten().collect();

        let graph = match self.dimension {
            Some(dimension) if !docs.is_empty() => {
                let rows: Vec<Vec<f32>> = docs
                    .iter()
                    .map(|d| self.params.metric.prepared(&d.vector))
                    .collect();
                Some(ann::build(
                    GraphConfig::from(&self.params),
                    self.params.quantization_type,
                    dimension,
                    &rows,
                )?)
            }
            _ => None,
        };

        self.graph = graph;
        self.internal_to_id = docs.iter().map(|d| Some(d.id.clone())).collect();
        self.id_to_internal = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i as u32))
            .collect();
        self.documents = docs.into_iter().map(|d| (d.id.clone(), d)).collect();
        Ok((self.documents.len(), tombstones))
    }

    /// Share of graph nodes that are tombstones.
    fn tombstone_ratio(&self) -> f64 {
        match &self.graph {
            Some(graph) if graph.node_count > 0 => {
                graph.deleted_count() as f64 / graph.node_count as f64
            }
            _ => 0.0,
        }
    }

    fn note_tombstones(&self) {
        let tombstones = self.graph.as_ref().map_or(0, GraphIndex::deleted_count);
        if tombstones == 0 {
            return;
        }
        let ratio = self.tombstone_ratio();
        if ratio > config::TOMBSTONE_WARN_RATIO {
            tracing::warn!(
                collection = %self.name,
                tombstones,
                ratio,
                "tombstones dominate the graph, reindex recommended"
            );
        } else {
            tracing::debug!(collection = %self.name, tombstones, "tombstoned nodes pending reindex");
        }
    }

    /// Resolve graph results to documents. Equal distances are ordered by
    /// ascending document id.
    fn hits(&self, results: Vec<(f32, u32)>) -> Vec<QueryHit> {
        let mut hits: Vec<QueryHit> = results
            .into_iter()
            .filter_map(|(distance, internal)| {
                self.document_at(internal).map(|doc| QueryHit {
                    document: Arc::clone(doc),
                    distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits
    }

    fn run_queries(
        &self,
        queries: &[Vec<f32>],
        filter: Option<&FilterClause>,
        limit: usize,
        ef_search: usize,
        num_threads: usize,
    ) -> Result<Vec<Vec<QueryHit>>> {
        check_search_args(limit, ef_search)?;
        executor::validate_threads(num_threads)?;
        if let Some(dim) = self.dimension {
            for q in queries {
                check_query(dim, q)?;
            }
        }
        let Some(graph) = &self.graph else {
            return Ok(vec![Vec::new(); queries.len()]);
        };

        let filter = filter.filter(|f| !f.is_empty());
        let filter_fn = |internal: u32| -> bool {
            match filter {
                Some(clause) => self
                    .document_at(internal)
                    .is_some_and(|doc| matches_filter(&doc.metadata, clause)),
                None => true,
            }
        };
        executor::run_batch(queries, num_threads, |q| {
            let query = graph.config.metric.prepared(q);
            let results = ann::knn_search_filtered(graph, &query, limit, ef_search, &filter_fn);
            self.hits(results)
        })
    }
}

/// A thread-safe, named document store with an embedded proximity graph.
///
/// Reads take the read lock; every mutating call holds the write lock for
/// its whole duration. Cloning produces another handle to the same data.
#[derive(Debug, Clone)]
pub struct Collection {
    pub data: Arc<RwLock<CollectionData>>,
}

impl Collection {
    /// Creates an empty collection. Without `dimension`, the first accepted
    /// document fixes it.
    pub fn new(name: &str, params: IndexParams, dimension: Option<usize>) -> Result<Self> {
        params::validate_name(name)?;
        params.validate()?;
        if let Some(d) = dimension {
            if d == 0 || d > config::MAX_DIMENSION {
                return Err(Error::Configuration(format!(
                    "dimension {d} out of range [1, {}]",
                    config::MAX_DIMENSION
                )));
            }
        }
        Ok(Self::from_data(CollectionData::new(
            name.to_string(),
            params,
            dimension,
        )))
    }

    pub(crate) fn from_data(data: CollectionData) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Insert new documents. Items whose id already exists (in the collection
    /// or earlier in the batch), or whose vector does not fit the schema, are
    /// rejected individually; the rest are stored.
    pub fn insert(&self, documents: Vec<Document>) -> Result<BatchReport> {
        self.data.write().write_batch(documents, WriteMode::Insert)
    }

    /// Insert or replace documents. Only schema mismatches are rejected.
    pub fn upsert(&self, documents: Vec<Document>) -> Result<BatchReport> {
        self.data.write().write_batch(documents, WriteMode::Upsert)
    }

    /// Remove documents by id. Unknown ids are ignored. Returns the number removed.
    pub fn delete_by_id(&self, ids: &[DocumentId]) -> usize {
        let mut data = self.data.write();
        let removed = ids.iter().filter(|id| data.remove(id)).count();
        if removed > 0 {
            tracing::debug!(collection = %data.name, removed, "documents deleted");
            data.note_tombstones();
        }
        removed
    }

    /// Remove every document whose metadata matches `filter`, returning their
    /// ids in insertion order.
    pub fn delete_by_filter(&self, filter: &FilterClause) -> Vec<DocumentId> {
        let mut data = self.data.write();
        let matched: Vec<DocumentId> = data
            .live_documents()
            .filter(|doc| matches_filter(&doc.metadata, filter))
            .map(|doc| doc.id.clone())
            .collect();
        for id in &matched {
            data.remove(id);
        }
        if !matched.is_empty() {
            tracing::debug!(collection = %data.name, removed = matched.len(), "documents deleted by filter");
            data.note_tombstones();
        }
        matched
    }

    /// Stored documents for `ids`, in request order. Unknown ids are skipped.
    pub fn get_by_id(&self, ids: &[DocumentId]) -> Vec<Arc<Document>> {
        let data = self.data.read();
        ids.iter()
            .filter_map(|id| data.documents.get(id).cloned())
            .collect()
    }

    /// Documents matching `filter` in insertion order, at most `limit` of them.
    pub fn filter_query(&self, filter: &FilterClause, limit: Option<usize>) -> Vec<Arc<Document>> {
        let data = self.data.read();
        data.live_documents()
            .filter(|doc| matches_filter(&doc.metadata, filter))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Nearest live documents for each query, in input order.
    pub fn batch_query(
        &self,
        queries: &[Vec<f32>],
        limit: usize,
        ef_search: usize,
        num_threads: usize,
    ) -> Result<Vec<Vec<QueryHit>>> {
        self.data
            .read()
            .run_queries(queries, None, limit, ef_search, num_threads)
    }

    /// [`batch_query`](Self::batch_query) restricted to documents matching
    /// `filter`. Non-matching nodes still route the traversal.
    pub fn batch_query_filtered(
        &self,
        queries: &[Vec<f32>],
        filter: &FilterClause,
        limit: usize,
        ef_search: usize,
        num_threads: usize,
    ) -> Result<Vec<Vec<QueryHit>>> {
        self.data
            .read()
            .run_queries(queries, Some(filter), limit, ef_search, num_threads)
    }

    /// Rebuild the graph from live documents, dropping tombstones and
    /// renumbering nodes in insertion order. The codec is refit on the live
    /// vectors. Returns the number of live documents.
    pub fn reindex(&self) -> Result<usize> {
        let mut data = self.data.write();
        let start = Instant::now();
        let (documents, tombstones) = data.rebuild(Vec::new())?;
        tracing::info!(
            collection = %data.name,
            documents,
            tombstones,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "collection reindexed"
        );
        Ok(documents)
    }

    pub fn name(&self) -> String {
        self.data.read().name.clone()
    }

    pub fn params(&self) -> IndexParams {
        self.data.read().params.clone()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.data.read().dimension
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.data.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tombstoned graph nodes awaiting [`reindex`](Self::reindex).
    pub fn deleted_count(&self) -> usize {
        self.data
            .read()
            .graph
            .as_ref()
            .map_or(0, GraphIndex::deleted_count)
    }

    /// Whether the collection holds a graph (it has accepted a document).
    pub fn is_built(&self) -> bool {
        self.data.read().graph.is_some()
    }

    /// The descriptor a save would write, without block checksums.
    pub fn schema(&self) -> IndexSchema {
        self.data.read().describe()
    }

    /// Persist to `dir` with an atomic directory swap. See [`crate::storage::save_collection`].
    pub fn save(&self, dir: &std::path::Path) -> Result<IndexSchema> {
        crate::storage::save_collection(self, dir)
    }
}
