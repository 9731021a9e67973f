//! Proximity graph structure and configuration.
//!
//! [`GraphIndex`] stores nodes in a Struct-of-Arrays arena: node `i` owns
//! bytes `i * code_len ..` of the code arena, floats `i * dimension ..` of the
//! raw arena, and `neighbors[i]`. Node ids are dense `u32` arena indices.

use crate::ann::visited::VisitedSet;
use crate::distance::{self, DistanceMetric};
use crate::params::{IndexParams, IndexType};
use crate::quantization::VectorCodec;
use serde::{Deserialize, Serialize};

/// Topology parameters fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub metric: DistanceMetric,
    pub index_type: IndexType,
    /// Bound on every adjacency list.
    pub max_nbrs: usize,
    /// Candidate list size while inserting.
    pub ef_construction: usize,
}

impl From<&IndexParams> for GraphConfig {
    fn from(params: &IndexParams) -> Self {
        Self {
            metric: params.metric,
            index_type: params.index_type,
            max_nbrs: params.max_nbrs,
            ef_construction: params.ef_construction,
        }
    }
}

/// Navigable proximity graph over encoded vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIndex {
    pub config: GraphConfig,
    pub dimension: usize,
    pub codec: VectorCodec,
    /// Quantized code arena, `codec.code_len()` bytes per node. Empty for raw codecs.
    pub codes: Vec<u8>,
    /// Prepared f32 arena. Populated for raw codecs and for fusion re-ranking.
    pub raw_vectors: Vec<f32>,
    pub neighbors: Vec<Vec<u32>>,
    pub deleted: Vec<bool>,
    pub entry_point: Option<u32>,
    pub node_count: u32,
}

impl GraphIndex {
    /// Creates an empty graph around a fitted codec.
    pub fn new(config: GraphConfig, codec: VectorCodec) -> Self {
        Self {
            dimension: codec.dimension(),
            config,
            codec,
            codes: Vec::new(),
            raw_vectors: Vec::new(),
            neighbors: Vec::new(),
            deleted: Vec::new(),
            entry_point: None,
            node_count: 0,
        }
    }

    /// Whether prepared f32 vectors are kept next to (or instead of) codes.
    pub fn stores_raw(&self) -> bool {
        !self.codec.is_quantized() || self.config.index_type == IndexType::Fusion
    }

    /// Number of non-deleted nodes.
    pub fn len(&self) -> usize {
        self.deleted.iter().filter(|&&d| !d).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.iter().filter(|&&d| d).count()
    }

    #[inline]
    pub fn is_deleted(&self, id: u32) -> bool {
        self.deleted[id as usize]
    }

    /// Tombstone a node. It stays navigable but is never returned.
    pub fn mark_deleted(&mut self, id: u32) -> bool {
        match self.deleted.get_mut(id as usize) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    #[inline]
    fn code(&self, id: u32) -> &[u8] {
        let len = self.codec.code_len();
        let start = id as usize * len;
        &self.codes[start..start + len]
    }

    #[inline]
    fn raw(&self, id: u32) -> &[f32] {
        let start = id as usize * self.dimension;
        &self.raw_vectors[start..start + self.dimension]
    }

    /// Append a prepared vector to the arenas. Returns its node id.
    pub(crate) fn push_node(&mut self, prepared: &[f32]) -> u32 {
        debug_assert_eq!(prepared.len(), self.dimension);
        let id = self.node_count;
        self.codec.encode_into(prepared, &mut self.codes);
        if self.stores_raw() {
            self.raw_vectors.extend_from_slice(prepared);
        }
        self.neighbors.push(Vec::new());
        self.deleted.push(false);
        self.node_count += 1;
        id
    }

    /// Traversal distance from a prepared query to a node: codes when quantized.
    #[inline]
    pub(crate) fn distance_to(&self, query: &[f32], id: u32) -> f32 {
        if self.codec.is_quantized() {
            self.codec
                .asym_distance(self.config.metric, query, self.code(id))
        } else {
            self.config.metric.prepared_distance(query, self.raw(id))
        }
    }

    /// Most precise distance available: raw vectors when stored, codes otherwise.
    #[inline]
    pub(crate) fn exact_distance(&self, query: &[f32], id: u32) -> f32 {
        if self.stores_raw() {
            self.config.metric.prepared_distance(query, self.raw(id))
        } else {
            self.codec
                .asym_distance(self.config.metric, query, self.code(id))
        }
    }

    /// Node-to-node distance used for pruning.
    #[inline]
    pub(crate) fn node_distance(&self, a: u32, b: u32) -> f32 {
        if self.stores_raw() {
            self.config
                .metric
                .prepared_distance(self.raw(a), self.raw(b))
        } else {
            self.codec
                .code_distance(self.config.metric, self.code(a), self.code(b))
        }
    }

    /// Write the stored (prepared, possibly dequantized) vector of `id` into `out`.
    pub fn vector_into(&self, id: u32, out: &mut [f32]) {
        if self.stores_raw() {
            out.copy_from_slice(self.raw(id));
        } else {
            self.codec.decode_codes_into(self.code(id), out);
        }
    }

    pub fn vector(&self, id: u32) -> Option<Vec<f32>> {
        if id >= self.node_count {
            return None;
        }
        let mut out = vec![0.0f32; self.dimension];
        self.vector_into(id, &mut out);
        Some(out)
    }

    /// Node ids reachable from the entry point, following out-edges.
    pub(crate) fn reachable(&self) -> Vec<bool> {
        let n = self.node_count as usize;
        let mut seen = vec![false; n];
        let Some(ep) = self.entry_point else {
            return seen;
        };
        let mut stack = vec![ep];
        seen[ep as usize] = true;
        self.flood(&mut stack, &mut seen);
        seen
    }

    pub(crate) fn flood(&self, stack: &mut Vec<u32>, seen: &mut [bool]) {
        while let Some(node) = stack.pop() {
            for &next in &self.neighbors[node as usize] {
                if !seen[next as usize] {
                    seen[next as usize] = true;
                    stack.push(next);
                }
            }
        }
    }

    /// Brute-force node nearest to the arena centroid (in L2 over stored vectors).
    pub(crate) fn medoid(&self) -> Option<u32> {
        let live: Vec<u32> = (0..self.node_count).filter(|&i| !self.is_deleted(i)).collect();
        if live.is_empty() {
            return None;
        }
        let mut centroid = vec![0.0f64; self.dimension];
        let mut buf = vec![0.0f32; self.dimension];
        for &id in &live {
            self.vector_into(id, &mut buf);
            for (c, &x) in centroid.iter_mut().zip(&buf) {
                *c += x as f64;
            }
        }
        let inv = 1.0 / live.len() as f64;
        let centroid: Vec<f32> = centroid.iter().map(|&c| (c * inv) as f32).collect();

        let mut best: Option<(f32, u32)> = None;
        for &id in &live {
            self.vector_into(id, &mut buf);
            let d = distance::l2_sq(&centroid, &buf);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// A visited set sized for this graph.
    pub(crate) fn visited_set(&self) -> VisitedSet {
        VisitedSet::with_capacity(self.node_count as usize)
    }

    /// Validate internal invariants after deserialization.
    ///
    /// Checks arena lengths against `node_count`, neighbor bounds, degree
    /// bounds, and the entry point.
    pub fn validate(&self) -> Result<(), String> {
        let nc = self.node_count as usize;
        let dim = self.dimension;

        self.codec.validate(dim)?;

        let code_len = self.codec.code_len();
        if self.codes.len() != nc * code_len {
            return Err(format!(
                "codes length {} != node_count({}) * code_len({})",
                self.codes.len(),
                nc,
                code_len
            ));
        }
        let expected_raw = if self.stores_raw() { nc * dim } else { 0 };
        if self.raw_vectors.len() != expected_raw {
            return Err(format!(
                "raw_vectors length {} != expected {}",
                self.raw_vectors.len(),
                expected_raw
            ));
        }
        if self.neighbors.len() != nc {
            return Err(format!(
                "neighbors length {} != node_count {}",
                self.neighbors.len(),
                nc
            ));
        }
        if self.deleted.len() != nc {
            return Err(format!(
                "deleted length {} != node_count {}",
                self.deleted.len(),
                nc
            ));
        }
        match self.entry_point {
            Some(ep) if ep as usize >= nc => {
                return Err(format!("entry_point {} >= node_count {}", ep, nc));
            }
            None if nc > 0 => return Err("non-empty graph has no entry point".to_string()),
            _ => {}
        }
        for (node_id, list) in self.neighbors.iter().enumerate() {
            if list.len() > self.config.max_nbrs {
                return Err(format!(
                    "node {} has {} neighbors, bound is {}",
                    node_id,
                    list.len(),
                    self.config.max_nbrs
                ));
            }
            if let Some(&bad) = list.iter().find(|&&n| n as usize >= nc) {
                return Err(format!(
                    "neighbor {} out of bounds (node_count={}) at node {}",
                    bad, nc, node_id
                ));
            }
        }
        Ok(())
    }
}
