//! HNSW search: single-layer beam search, greedy descent, and top-k KNN.
//!
//! Both ordered collections are proper binary heaps keyed by similarity:
//! candidates pop the best first, results evict the worst when over the beam
//! width. Dangling neighbor ids (node absent from the arena) are skipped
//! with a warning; they are artifacts of the non-atomic persistence
//! discipline and must not be fatal.

use crate::hnsw::graph::HnswGraph;
use crate::hnsw::similarity::cosine_similarity;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use uuid::Uuid;

/// A node paired with its similarity to the current query.
/// Orders by similarity, then id so that equality is consistent with `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Scored {
    pub score: OrderedFloat<f32>,
    pub id: Uuid,
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl HnswGraph {
    /// Beam-width-1 hill climb on a single layer.
    ///
    /// Repeatedly scans the current node's neighbors and moves to the most
    /// similar one until no neighbor improves on the current similarity.
    pub(crate) fn greedy_step(&self, query: &[f32], start: Uuid, layer: usize) -> Uuid {
        let mut cur = start;
        let mut cur_score = match self.nodes.get(&cur) {
            Some(node) => cosine_similarity(query, &node.vector),
            None => return cur,
        };

        loop {
            let Some(node) = self.nodes.get(&cur) else {
                break;
            };
            let Some(neighbor_ids) = node.neighbors.get(layer) else {
                break;
            };

            let mut improved = false;
            let mut best = cur;
            let mut best_score = cur_score;
            for nid in neighbor_ids {
                let Some(neighbor) = self.nodes.get(nid) else {
                    tracing::warn!(id = %nid, layer, "skipping dangling neighbor id");
                    continue;
                };
                let s = cosine_similarity(query, &neighbor.vector);
                if s > best_score {
                    best = *nid;
                    best_score = s;
                    improved = true;
                }
            }
            if !improved {
                break;
            }
            cur = best;
            cur_score = best_score;
        }
        cur
    }

    /// Best-first beam search on one layer with beam width `ef`.
    ///
    /// Returns up to `ef` nodes sorted by descending similarity to `query`.
    pub(crate) fn search_layer(
        &self,
        query: &[f32],
        entry: Uuid,
        ef: usize,
        layer: usize,
    ) -> Vec<Scored> {
        let Some(entry_node) = self.nodes.get(&entry) else {
            tracing::warn!(id = %entry, layer, "search entry point has no node");
            return Vec::new();
        };

        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(entry);

        let entry_scored = Scored {
            score: OrderedFloat(cosine_similarity(query, &entry_node.vector)),
            id: entry,
        };
        // Candidates pop best-first; results peek at the current worst.
        let mut candidates: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(ef + 1);
        candidates.push(entry_scored);
        results.push(Reverse(entry_scored));

        while let Some(candidate) = candidates.pop() {
            let worst = results
                .peek()
                .map(|Reverse(s)| s.score)
                .unwrap_or(OrderedFloat(f32::MIN));
            if candidate.score < worst && results.len() >= ef {
                break;
            }

            let Some(node) = self.nodes.get(&candidate.id) else {
                continue;
            };
            let Some(neighbor_ids) = node.neighbors.get(layer) else {
                continue;
            };

            for nid in neighbor_ids {
                if !visited.insert(*nid) {
                    continue;
                }
                let Some(neighbor) = self.nodes.get(nid) else {
                    tracing::warn!(id = %nid, layer, "skipping dangling neighbor id");
                    continue;
                };
                let s = OrderedFloat(cosine_similarity(query, &neighbor.vector));
                let worst = results
                    .peek()
                    .map(|Reverse(s)| s.score)
                    .unwrap_or(OrderedFloat(f32::MIN));
                if results.len() < ef || s > worst {
                    let scored = Scored { score: s, id: *nid };
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|Reverse(s)| s).collect();
        out.sort_unstable_by(|a, b| b.cmp(a));
        out
    }

    /// Top-k approximate nearest neighbor search.
    ///
    /// Descends greedily from the top layer down to layer 1, then runs the
    /// layer-0 beam search with `ef_search`. Returns `(id, similarity)`
    /// pairs in descending similarity order, at most `k` of them.
    pub fn knn_search(&self, query: &[f32], k: usize) -> Vec<(Uuid, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };

        let mut cur = entry;
        for layer in (1..=self.max_level).rev() {
            cur = self.greedy_step(query, cur, layer);
        }

        let ef = self.params.ef_search.max(k);
        self.search_layer(query, cur, ef, 0)
            .into_iter()
            .take(k)
            .map(|s| (s.id, s.score.0))
            .collect()
    }
}
