//! Graph construction: incremental insertion, diversity pruning, and
//! connectivity repair.
//!
//! Each inserted vector searches the current graph from the entry point with
//! `ef_construction`, keeps the candidates that pass the diversity rule, and
//! links back from every kept neighbor, pruning neighbor lists that overflow
//! `max_nbrs`. Insertion order fully determines the topology.

use crate::ann::graph::{GraphConfig, GraphIndex};
use crate::ann::search::{search_layer, sort_by_distance};
use crate::ann::visited::VisitedSet;
use crate::error::Result;
use crate::params::{IndexType, QuantizationType};
use crate::quantization::VectorCodec;
use std::collections::HashSet;

/// Repair passes before giving up on nodes that keep losing their in-edges.
const MAX_REPAIR_PASSES: usize = 8;

impl GraphIndex {
    /// Insert a prepared vector and link it into the graph. Returns its node id.
    pub fn insert(&mut self, prepared: &[f32], visited: &mut VisitedSet) -> u32 {
        let id = self.push_node(prepared);
        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(id);
            return id;
        };

        let no_filter = |_: u32| true;
        let found = search_layer(
            self,
            prepared,
            std::slice::from_ref(&entry_point),
            self.config.ef_construction,
            visited,
            &no_filter,
        );
        let candidates: Vec<(f32, u32)> = found
            .into_iter()
            .filter(|&(_, c)| c != id)
            .map(|(d, c)| {
                if self.stores_raw() {
                    (self.exact_distance(prepared, c), c)
                } else {
                    (d, c)
                }
            })
            .collect();

        let selected = self.select_neighbors(&candidates);
        self.neighbors[id as usize] = selected.iter().map(|&(_, n)| n).collect();

        for &(_, neighbor_id) in &selected {
            let nid = neighbor_id as usize;
            if self.neighbors[nid].contains(&id) {
                continue;
            }
            self.neighbors[nid].push(id);

            if self.neighbors[nid].len() > self.config.max_nbrs {
                let scored: Vec<(f32, u32)> = self.neighbors[nid]
                    .iter()
                    .map(|&c| (self.node_distance(neighbor_id, c), c))
                    .collect();
                let pruned = self.select_neighbors(&scored);
                self.neighbors[nid] = pruned.into_iter().map(|(_, c)| c).collect();
            }
        }

        id
    }

    /// Diversity-rule neighbor selection.
    ///
    /// A candidate is kept only if it is at least as close to the base node as
    /// to every neighbor already kept. Fusion graphs then fill the remaining
    /// slots with the closest unused candidates.
    fn select_neighbors(&self, candidates: &[(f32, u32)]) -> Vec<(f32, u32)> {
        let m = self.config.max_nbrs;
        let mut sorted = candidates.to_vec();
        sort_by_distance(&mut sorted);

        let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
        for &(dist_to_base, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            let is_diverse = selected
                .iter()
                .all(|&(_, sid)| dist_to_base <= self.node_distance(cid, sid));
            if is_diverse {
                selected.push((dist_to_base, cid));
            }
        }

        if self.config.index_type == IndexType::Fusion && selected.len() < m {
            let selected_ids: HashSet<u32> = selected.iter().map(|&(_, id)| id).collect();
            for &(dist, cid) in &sorted {
                if selected.len() >= m {
                    break;
                }
                if !selected_ids.contains(&cid) {
                    selected.push((dist, cid));
                }
            }
        }

        selected
    }

    /// Move the entry point to the node nearest the centroid, then make every
    /// live node reachable from it.
    pub fn finalize(&mut self, visited: &mut VisitedSet) {
        if let Some(medoid) = self.medoid() {
            self.entry_point = Some(medoid);
        }
        self.repair_connectivity(visited);
    }

    /// Link every live node that greedy search cannot reach from the entry
    /// point. Returns the number of edges added.
    pub fn repair_connectivity(&mut self, visited: &mut VisitedSet) -> usize {
        let Some(entry_point) = self.entry_point else {
            return 0;
        };
        let mut added = 0;

        for pass in 0..MAX_REPAIR_PASSES {
            let mut seen = self.reachable();
            let orphans: Vec<u32> = (0..self.node_count)
                .filter(|&u| !seen[u as usize] && !self.is_deleted(u))
                .collect();
            if orphans.is_empty() {
                break;
            }
            if pass + 1 == MAX_REPAIR_PASSES {
                tracing::warn!(
                    unreachable = orphans.len(),
                    "graph connectivity repair gave up"
                );
                break;
            }

            let mut in_degree = vec![0u32; self.node_count as usize];
            for list in &self.neighbors {
                for &n in list {
                    in_degree[n as usize] += 1;
                }
            }

            let mut buf = vec![0.0f32; self.dimension];
            for u in orphans {
                if seen[u as usize] {
                    continue;
                }
                self.vector_into(u, &mut buf);
                let no_filter = |_: u32| true;
                let found = search_layer(
                    self,
                    &buf,
                    std::slice::from_ref(&entry_point),
                    self.config.ef_construction,
                    visited,
                    &no_filter,
                );
                let anchor = found
                    .iter()
                    .map(|&(_, r)| r)
                    .find(|&r| self.neighbors[r as usize].len() < self.config.max_nbrs)
                    .or_else(|| found.first().map(|&(_, r)| r))
                    .unwrap_or(entry_point);

                let list = &self.neighbors[anchor as usize];
                if list.len() >= self.config.max_nbrs {
                    // Evict the farthest neighbor that keeps another in-edge.
                    let victim = list
                        .iter()
                        .enumerate()
                        .map(|(pos, &n)| (self.node_distance(anchor, n), pos, n))
                        .filter(|&(_, _, n)| in_degree[n as usize] > 1)
                        .max_by(|a, b| a.0.total_cmp(&b.0))
                        .or_else(|| {
                            list.iter()
                                .enumerate()
                                .map(|(pos, &n)| (self.node_distance(anchor, n), pos, n))
                                .max_by(|a, b| a.0.total_cmp(&b.0))
                        });
                    if let Some((_, pos, n)) = victim {
                        in_degree[n as usize] -= 1;
                        self.neighbors[anchor as usize].swap_remove(pos);
                    }
                }
                self.neighbors[anchor as usize].push(u);
                in_degree[u as usize] += 1;
                added += 1;

                seen[u as usize] = true;
                let mut stack = vec![u];
                self.flood(&mut stack, &mut seen);
            }
        }

        if added > 0 {
            tracing::debug!(edges = added, "connectivity repair linked unreachable nodes");
        }
        added
    }
}

/// Build a graph over prepared rows in input order.
pub fn build(
    config: GraphConfig,
    quantization_type: QuantizationType,
    dimension: usize,
    rows: &[Vec<f32>],
) -> Result<GraphIndex> {
    let codec = VectorCodec::fit(quantization_type, dimension, rows)?;
    let mut graph = GraphIndex::new(config, codec);
    graph.neighbors.reserve(rows.len());
    graph.deleted.reserve(rows.len());

    let mut visited = VisitedSet::with_capacity(rows.len());
    for row in rows {
        graph.insert(row, &mut visited);
    }
    graph.finalize(&mut visited);
    Ok(graph)
}
