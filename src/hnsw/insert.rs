//! HNSW insertion.
//!
//! Three phases: greedy descent through the layers above the new node's
//! level, per-layer beam search with top-M neighbor selection, then
//! symmetric back-links with pruning of over-capacity neighbor lists.
//! Returns the set of touched node ids (the new id plus every node whose
//! adjacency changed) which drives granular persistence.

use crate::error::{IndexError, Result};
use crate::hnsw::graph::{HnswGraph, HnswNode};
use crate::hnsw::search::Scored;
use crate::hnsw::similarity::cosine_similarity;
use std::collections::HashSet;
use uuid::Uuid;

impl HnswGraph {
    /// Insert a new point into the graph.
    ///
    /// Fails with [`IndexError::DuplicateId`] if the id is already present
    /// and [`IndexError::DimensionMismatch`] if the vector's length differs
    /// from the dimensionality fixed by the first insert.
    pub fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> Result<HashSet<Uuid>> {
        if self.nodes.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        match self.dimension {
            Some(expected) if vector.len() != expected => {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }

        let level = self.random_level();
        let mut touched = HashSet::new();
        touched.insert(id);

        // First node becomes the sole entry point.
        let Some(entry) = self.entry_point else {
            self.nodes.insert(id, HnswNode::new(id, vector, level));
            self.entry_point = Some(id);
            self.max_level = level;
            return Ok(touched);
        };

        // Phase 1: descend greedily through layers above the node's level.
        let mut cur = entry;
        for layer in (level + 1..=self.max_level).rev() {
            cur = self.greedy_step(&vector, cur, layer);
        }

        // Phase 2: per-layer candidate search; take the top M as neighbors
        // and seed the next lower layer with the best candidate found.
        let top = level.min(self.max_level);
        let mut node = HnswNode::new(id, vector, level);
        for layer in (0..=top).rev() {
            let candidates =
                self.search_layer(&node.vector, cur, self.params.ef_construction, layer);
            node.neighbors[layer] = select_neighbors(&candidates, self.params.m);
            if let Some(best) = candidates.first() {
                cur = best.id;
            }
        }
        self.nodes.insert(id, node);

        // Phase 3: symmetric back-links; prune any list that overflows M.
        for layer in 0..=top {
            let selected = match self.nodes.get(&id) {
                Some(n) => n.neighbors[layer].clone(),
                None => break,
            };
            for nid in selected {
                let Some(neighbor) = self.nodes.get_mut(&nid) else {
                    tracing::warn!(id = %nid, layer, "selected neighbor vanished before back-link");
                    continue;
                };
                // Loaded crash artifacts can be short a layer list.
                while neighbor.neighbors.len() <= layer {
                    neighbor.neighbors.push(Vec::new());
                }
                neighbor.neighbors[layer].push(id);
                touched.insert(nid);

                if neighbor.neighbors[layer].len() > self.params.m {
                    let base = neighbor.vector.clone();
                    let list = neighbor.neighbors[layer].clone();
                    let pruned = self.prune_neighbors(&base, &list);
                    if let Some(neighbor) = self.nodes.get_mut(&nid) {
                        neighbor.neighbors[layer] = pruned;
                    }
                }
            }
        }

        // A taller node becomes the new entry point.
        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        }

        Ok(touched)
    }

    /// Keep the `m` highest-similarity members of `list` relative to `base`.
    /// Dangling ids fall out of the list here.
    fn prune_neighbors(&self, base: &[f32], list: &[Uuid]) -> Vec<Uuid> {
        let mut scored: Vec<(f32, Uuid)> = list
            .iter()
            .filter_map(|cid| {
                self.nodes
                    .get(cid)
                    .map(|n| (cosine_similarity(base, &n.vector), *cid))
            })
            .collect();
        scored.sort_unstable_by(|a, b| {
            b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.params.m);
        scored.into_iter().map(|(_, cid)| cid).collect()
    }
}

/// Baseline neighbor selection: the `m` highest-similarity candidates.
/// `candidates` is already sorted descending by similarity.
fn select_neighbors(candidates: &[Scored], m: usize) -> Vec<Uuid> {
    candidates.iter().take(m).map(|s| s.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::graph::HnswParams;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
        let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    #[test]
    fn test_first_insert_becomes_entry_point() {
        let mut graph = HnswGraph::new(HnswParams::default());
        let id = Uuid::new_v4();
        let touched = graph.insert(id, vec![1.0, 0.0]).unwrap();
        assert_eq!(touched, HashSet::from([id]));
        assert_eq!(graph.entry_point, Some(id));
        assert_eq!(graph.dimension, Some(2));
        let node = &graph.nodes[&id];
        assert_eq!(node.level, graph.max_level);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = HnswGraph::new(HnswParams::default());
        let id = Uuid::new_v4();
        graph.insert(id, vec![1.0, 0.0]).unwrap();
        let err = graph.insert(id, vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateId(d) if d == id));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut graph = HnswGraph::new(HnswParams::default());
        graph.insert(Uuid::new_v4(), vec![1.0, 0.0, 0.0]).unwrap();
        let err = graph.insert(Uuid::new_v4(), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn test_touched_set_covers_modified_nodes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut graph = HnswGraph::new(HnswParams::default());
        let mut prior: Vec<Uuid> = Vec::new();
        for _ in 0..20 {
            let id = Uuid::new_v4();
            graph.insert(id, unit_vector(&mut rng, 8)).unwrap();
            prior.push(id);
        }

        let before: std::collections::HashMap<Uuid, Vec<Vec<Uuid>>> = graph
            .nodes
            .iter()
            .map(|(id, n)| (*id, n.neighbors.clone()))
            .collect();

        let new_id = Uuid::new_v4();
        let touched = graph.insert(new_id, unit_vector(&mut rng, 8)).unwrap();
        assert!(touched.contains(&new_id));

        for (id, old_neighbors) in &before {
            let now = &graph.nodes[id].neighbors;
            if now != old_neighbors {
                assert!(
                    touched.contains(id),
                    "node {id} changed but was not reported as touched"
                );
            }
        }
    }

    #[test]
    fn test_degree_bound_invariant() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut graph = HnswGraph::new(HnswParams::default());
        for _ in 0..300 {
            graph.insert(Uuid::new_v4(), unit_vector(&mut rng, 16)).unwrap();
        }
        for node in graph.nodes.values() {
            assert_eq!(node.neighbors.len(), node.level + 1);
            for (layer, list) in node.neighbors.iter().enumerate() {
                assert!(
                    list.len() <= graph.params.m,
                    "node {} exceeds degree bound on layer {layer}: {}",
                    node.id,
                    list.len()
                );
            }
        }
    }

    #[test]
    fn test_entry_point_is_tallest() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut graph = HnswGraph::new(HnswParams::default());
        for _ in 0..200 {
            graph.insert(Uuid::new_v4(), unit_vector(&mut rng, 8)).unwrap();
        }
        let ep = graph.entry_point.unwrap();
        let ep_level = graph.nodes[&ep].level;
        assert_eq!(ep_level, graph.max_level);
        for node in graph.nodes.values() {
            assert!(ep_level >= node.level);
        }
    }

    #[test]
    fn test_links_are_symmetric_on_fresh_graph() {
        // Symmetry holds modulo pruning; with few well-spread points no
        // list overflows, so every link must be reciprocated.
        let mut graph = HnswGraph::new(HnswParams::default());
        let mut ids = Vec::new();
        for i in 0..8 {
            let mut v = vec![0.0f32; 8];
            v[i] = 1.0;
            let id = Uuid::new_v4();
            graph.insert(id, v).unwrap();
            ids.push(id);
        }
        for node in graph.nodes.values() {
            for (layer, list) in node.neighbors.iter().enumerate() {
                for nid in list {
                    let other = &graph.nodes[nid];
                    assert!(
                        other.neighbors[layer].contains(&node.id),
                        "link {} -> {} on layer {layer} is not reciprocated",
                        node.id,
                        nid
                    );
                }
            }
        }
    }
}
