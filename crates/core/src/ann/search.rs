//! Beam search over the proximity graph.
//!
//! Supports an optional predicate `Fn(u32) -> bool` applied during traversal.
//! Filtered and deleted nodes are still used for navigation but excluded from
//! results. Ties on distance resolve by ascending node id.

use crate::ann::graph::GraphIndex;
use crate::ann::visited::VisitedSet;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

thread_local! {
    /// Per-thread visited marks, reused across queries on the same worker.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::default());
}

/// Frontier entry. Ordered so the max-heap pops the closest (then lowest id) first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .cmp(&self.distance)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result entry. Max-heap by (distance, id) so the worst result is on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

/// Sort `(distance, id)` pairs ascending with id tie-break.
pub fn sort_by_distance(results: &mut [(f32, u32)]) {
    results.sort_unstable_by(|a, b| {
        OrderedFloat(a.0)
            .cmp(&OrderedFloat(b.0))
            .then_with(|| a.1.cmp(&b.1))
    });
}

/// Greedy beam search keeping at most `ef` results.
///
/// Returns matching non-deleted nodes sorted by traversal distance.
pub fn search_layer<F: Fn(u32) -> bool>(
    index: &GraphIndex,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    visited: &mut VisitedSet,
    filter_fn: &F,
) -> Vec<(f32, u32)> {
    visited.reset(index.node_count as usize);
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    let mut worst = ResultEntry {
        distance: OrderedFloat(f32::MAX),
        id: u32::MAX,
    };

    let offer = |results: &mut BinaryHeap<ResultEntry>, entry: ResultEntry| -> ResultEntry {
        results.push(entry);
        if results.len() > ef {
            results.pop();
        }
        if results.len() >= ef {
            results.peek().copied().unwrap_or(entry)
        } else {
            ResultEntry {
                distance: OrderedFloat(f32::MAX),
                id: u32::MAX,
            }
        }
    };

    for &ep in entry_points {
        if visited.first_visit(ep) {
            let dist = OrderedFloat(index.distance_to(query, ep));
            candidates.push(Candidate { distance: dist, id: ep });
            if !index.is_deleted(ep) && filter_fn(ep) {
                worst = offer(&mut results, ResultEntry { distance: dist, id: ep });
            }
        }
    }

    while let Some(candidate) = candidates.pop() {
        // Closest frontier node is already worse than a full result set.
        if results.len() >= ef && candidate.distance > worst.distance {
            break;
        }

        for &neighbor_id in &index.neighbors[candidate.id as usize] {
            if !visited.first_visit(neighbor_id) {
                continue;
            }

            let entry = ResultEntry {
                distance: OrderedFloat(index.distance_to(query, neighbor_id)),
                id: neighbor_id,
            };
            if results.len() < ef || entry < worst {
                candidates.push(Candidate {
                    distance: entry.distance,
                    id: neighbor_id,
                });
                if !index.is_deleted(neighbor_id) && filter_fn(neighbor_id) {
                    worst = offer(&mut results, entry);
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// Top-`k` search with candidate list size `ef` (raised to `k` when smaller).
pub fn knn_search(index: &GraphIndex, query: &[f32], k: usize, ef: usize) -> Vec<(f32, u32)> {
    knn_search_filtered(index, query, k, ef, &|_: u32| true)
}

/// Top-`k` search restricted to nodes accepted by `filter_fn`.
///
/// When the graph keeps raw vectors next to quantized codes (fusion), the
/// surviving candidates are re-ranked with exact distances.
pub fn knn_search_filtered<F: Fn(u32) -> bool>(
    index: &GraphIndex,
    query: &[f32],
    k: usize,
    ef: usize,
    filter_fn: &F,
) -> Vec<(f32, u32)> {
    let Some(entry_point) = index.entry_point else {
        return Vec::new();
    };
    if k == 0 {
        return Vec::new();
    }

    SEARCH_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();
        let mut results = search_layer(
            index,
            query,
            std::slice::from_ref(&entry_point),
            ef.max(k),
            &mut *visited,
            filter_fn,
        );

        if index.codec.is_quantized() && index.stores_raw() {
            for r in results.iter_mut() {
                r.0 = index.exact_distance(query, r.1);
            }
            sort_by_distance(&mut results);
        }

        results.truncate(k);
        results
    })
}
