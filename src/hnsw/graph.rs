//! HNSW graph structure and parameters.
//!
//! [`HnswParams`] defines tuning parameters (M, ef_construction, ef_search,
//! level multiplier). [`HnswGraph`] stores nodes in an arena keyed by their
//! document UUID; all edits go through the arena and the graph never holds
//! direct references into another node.

use crate::config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Tuning parameters for an HNSW graph. Fixed at index creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswParams {
    /// Target maximum out-degree per node per layer.
    pub m: usize,
    /// Candidate beam width during construction.
    pub ef_construction: usize,
    /// Candidate beam width during layer-0 search.
    pub ef_search: usize,
    /// Probability of promoting a node one layer up in the level draw.
    pub level_multiplier: f64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            level_multiplier: 1.0 / (config::HNSW_DEFAULT_M as f64).ln(),
        }
    }
}

/// A single graph node: the indexed vector plus per-layer adjacency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswNode {
    /// Equal to the owning document's id.
    pub id: Uuid,
    /// Copy of the document's embedding.
    pub vector: Vec<f32>,
    /// Highest layer this node appears on.
    pub level: usize,
    /// `neighbors[l]` is the adjacency list on layer `l`; length `level + 1`.
    pub neighbors: Vec<Vec<Uuid>>,
}

impl HnswNode {
    /// Creates a node with empty neighbor lists on every layer up to `level`.
    pub fn new(id: Uuid, vector: Vec<f32>, level: usize) -> Self {
        Self {
            id,
            vector,
            level,
            neighbors: vec![Vec::new(); level + 1],
        }
    }
}

/// Scalar graph state persisted alongside the nodes under the well-known
/// meta key. Restoring a graph is `params + scalars + streamed nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub level_multiplier: f64,
    /// Maximum layer currently in use.
    pub max_level: usize,
    /// Top-down search entry, or `None` for an empty graph.
    pub entry_point: Option<Uuid>,
    /// Dimensionality fixed by the first inserted vector.
    pub dimension: Option<usize>,
}

/// In-memory hierarchical graph over an id-keyed node arena.
#[derive(Debug, Serialize, Deserialize)]
pub struct HnswGraph {
    pub params: HnswParams,
    pub nodes: HashMap<Uuid, HnswNode>,
    /// Id of the node that seeds top-down search. `None` when empty.
    pub entry_point: Option<Uuid>,
    /// Layer of the entry point; 0 when empty.
    pub max_level: usize,
    /// Set by the first insert; later inserts must match.
    pub dimension: Option<usize>,
}

impl HnswGraph {
    /// Creates an empty graph with the given parameters.
    pub fn new(params: HnswParams) -> Self {
        Self {
            params,
            nodes: HashMap::new(),
            entry_point: None,
            max_level: 0,
            dimension: None,
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if a node with the given id is present.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.nodes.contains_key(id)
    }

    /// Draw a level for a new node: geometric-like, capped at
    /// [`config::HNSW_MAX_LEVEL`].
    pub fn random_level(&self) -> usize {
        let mut level = 0;
        while rand::random::<f64>() < self.params.level_multiplier
            && level < config::HNSW_MAX_LEVEL
        {
            level += 1;
        }
        level
    }

    /// Snapshot the scalar state for persistence.
    pub fn meta(&self) -> IndexMeta {
        IndexMeta {
            m: self.params.m,
            ef_construction: self.params.ef_construction,
            ef_search: self.params.ef_search,
            level_multiplier: self.params.level_multiplier,
            max_level: self.max_level,
            entry_point: self.entry_point,
            dimension: self.dimension,
        }
    }

    /// Rebuild a graph from persisted meta and streamed nodes.
    ///
    /// If the recorded entry point is missing from the node set (crash
    /// artifact), the highest-level surviving node is promoted instead.
    pub fn restore(meta: IndexMeta, nodes: Vec<HnswNode>) -> Self {
        let params = HnswParams {
            m: meta.m,
            ef_construction: meta.ef_construction,
            ef_search: meta.ef_search,
            level_multiplier: meta.level_multiplier,
        };
        let node_map: HashMap<Uuid, HnswNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut graph = Self {
            params,
            nodes: node_map,
            entry_point: meta.entry_point,
            max_level: meta.max_level,
            dimension: meta.dimension,
        };

        match graph.entry_point {
            Some(ep) if !graph.nodes.contains_key(&ep) => {
                let replacement = graph
                    .nodes
                    .values()
                    .max_by_key(|n| n.level)
                    .map(|n| (n.id, n.level));
                tracing::warn!(
                    entry_point = %ep,
                    "persisted entry point has no node; promoting a replacement"
                );
                match replacement {
                    Some((id, level)) => {
                        graph.entry_point = Some(id);
                        graph.max_level = level;
                    }
                    None => {
                        graph.entry_point = None;
                        graph.max_level = 0;
                    }
                }
            }
            None if !graph.nodes.is_empty() => {
                // Meta said empty but nodes survived; promote the tallest.
                if let Some(n) = graph.nodes.values().max_by_key(|n| n.level) {
                    tracing::warn!(
                        nodes = graph.nodes.len(),
                        "meta records no entry point but nodes exist; promoting one"
                    );
                    graph.entry_point = Some(n.id);
                    graph.max_level = n.level;
                }
            }
            _ => {}
        }
        graph
    }

    /// Drop all nodes and scalar state, keeping the parameters.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.dimension = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_empty_graph() {
        let graph = HnswGraph::new(HnswParams::default());
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(graph.entry_point.is_none());
        assert_eq!(graph.max_level, 0);
        assert!(graph.dimension.is_none());
    }

    #[test]
    fn test_default_params() {
        let params = HnswParams::default();
        assert_eq!(params.m, 16);
        assert_eq!(params.ef_construction, 200);
        assert_eq!(params.ef_search, 200);
        let expected = 1.0 / (16f64).ln();
        assert!((params.level_multiplier - expected).abs() < 1e-12);
    }

    #[test]
    fn test_random_level_respects_cap() {
        let graph = HnswGraph::new(HnswParams::default());
        for _ in 0..1000 {
            assert!(graph.random_level() <= config::HNSW_MAX_LEVEL);
        }
    }

    #[test]
    fn test_random_level_mostly_zero() {
        // With multiplier 1/ln(16) ≈ 0.36, level 0 should dominate.
        let graph = HnswGraph::new(HnswParams::default());
        let zeros = (0..1000).filter(|_| graph.random_level() == 0).count();
        assert!(zeros > 500, "expected a majority of level-0 draws, got {zeros}");
    }

    #[test]
    fn test_node_has_one_list_per_layer() {
        let node = HnswNode::new(Uuid::new_v4(), vec![1.0], 3);
        assert_eq!(node.neighbors.len(), 4);
        assert!(node.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_meta_roundtrip_restores_params() {
        let mut graph = HnswGraph::new(HnswParams::default());
        graph.dimension = Some(8);
        let meta = graph.meta();
        let restored = HnswGraph::restore(meta, Vec::new());
        assert_eq!(restored.params.m, graph.params.m);
        assert_eq!(restored.dimension, Some(8));
        assert!(restored.entry_point.is_none());
    }

    #[test]
    fn test_restore_promotes_replacement_entry_point() {
        let survivor = HnswNode::new(Uuid::new_v4(), vec![1.0, 0.0], 2);
        let meta = IndexMeta {
            m: 16,
            ef_construction: 200,
            ef_search: 200,
            level_multiplier: 0.36,
            max_level: 5,
            entry_point: Some(Uuid::new_v4()), // no matching node
            dimension: Some(2),
        };
        let graph = HnswGraph::restore(meta, vec![survivor.clone()]);
        assert_eq!(graph.entry_point, Some(survivor.id));
        assert_eq!(graph.max_level, 2);
    }

    #[test]
    fn test_reset_preserves_params() {
        let mut graph = HnswGraph::new(HnswParams {
            m: 8,
            ..HnswParams::default()
        });
        graph.dimension = Some(4);
        graph.max_level = 3;
        graph.reset();
        assert!(graph.is_empty());
        assert!(graph.dimension.is_none());
        assert_eq!(graph.max_level, 0);
        assert_eq!(graph.params.m, 8);
    }

    #[test]
    fn test_json_roundtrip_is_stable() {
        let mut graph = HnswGraph::new(HnswParams::default());
        let node = HnswNode::new(Uuid::new_v4(), vec![0.5, 0.5], 0);
        graph.entry_point = Some(node.id);
        graph.dimension = Some(2);
        graph.nodes.insert(node.id, node);

        let first = serde_json::to_value(&graph).unwrap();
        let back: HnswGraph = serde_json::from_value(first.clone()).unwrap();
        let second = serde_json::to_value(&back).unwrap();
        assert_eq!(first, second);
    }
}
