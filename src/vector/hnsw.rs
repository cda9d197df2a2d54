//! HNSW (Hierarchical Navigable Small World) graph for approximate
//! nearest-neighbor search.
//!
//! A multi-layer graph where each layer holds a subset of the nodes below it,
//! enabling logarithmic navigation through the vector space. Nodes are vector
//! ordinals; the vector bytes themselves live in the flat store, and the
//! graph only keeps adjacency. Search is budgeted: every scored node counts
//! against a visited limit, and exhausting the budget yields a partial,
//! lower-bound result instead of an error.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ahash::AHashSet;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PeltaError, Result};

/// Configuration for HNSW graph construction and search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum number of connections per node in layer 0.
    pub m: usize,
    /// Maximum number of connections per node in higher layers.
    pub m_upper: usize,
    /// Multiplier that controls the probability of layer assignment.
    pub level_multiplier: f64,
    /// Size of the candidate set during construction.
    pub ef_construction: usize,
    /// Size of the candidate set during search.
    pub ef_search: usize,
    /// Random seed for reproducible layer assignment.
    pub seed: u64,
    /// Lowest acceptable overlap fraction between approximate and exact
    /// top-k results. A tuning knob, not a hard guarantee; tests and
    /// deployments pick their own band.
    pub recall_floor: f32,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            m_upper: 8,
            level_multiplier: 1.0 / (2.0_f64.ln()),
            ef_construction: 100,
            ef_search: 50,
            seed: 42,
            recall_floor: 0.3,
        }
    }
}

impl HnswConfig {
    /// Validate the configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.m == 0 {
            return Err(PeltaError::invalid_operation("M must be > 0"));
        }
        if self.ef_construction < self.m {
            return Err(PeltaError::invalid_operation(
                "ef_construction must be >= M",
            ));
        }
        if !(0.0..=1.0).contains(&self.recall_floor) {
            return Err(PeltaError::invalid_operation(
                "recall_floor must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

/// A node's adjacency, one connection list per layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HnswNode {
    /// connections[layer] holds neighbor ordinals at that layer.
    connections: Vec<Vec<u32>>,
    max_layer: usize,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        HnswNode {
            connections: vec![Vec::new(); max_layer + 1],
            max_layer,
        }
    }

    fn neighbors(&self, layer: usize) -> &[u32] {
        if layer <= self.max_layer {
            &self.connections[layer]
        } else {
            &[]
        }
    }
}

/// Priority queue entry during search: score plus node ordinal.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    score: f32,
    ord: u32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher scores sort first in a max-heap
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.ord.cmp(&other.ord))
    }
}

/// Outcome of a budgeted graph search.
#[derive(Debug, Clone)]
pub struct GraphSearchResult {
    /// (ordinal, score) pairs, best first.
    pub neighbors: Vec<(u32, f32)>,
    /// Number of nodes scored.
    pub visited: usize,
    /// True when the visited budget ran out before the search converged.
    pub incomplete: bool,
}

/// The persisted HNSW graph of one vector field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    nodes: Vec<HnswNode>,
    entry_point: Option<u32>,
    max_layer: usize,
}

impl HnswGraph {
    /// Build a graph over `size` ordinals.
    ///
    /// `score(a, b)` must return the similarity of the two stored vectors,
    /// higher meaning closer.
    pub fn build(
        size: u32,
        config: &HnswConfig,
        score: impl Fn(u32, u32) -> Result<f32>,
    ) -> Result<HnswGraph> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut graph = HnswGraph {
            nodes: Vec::with_capacity(size as usize),
            entry_point: None,
            max_layer: 0,
        };

        for ord in 0..size {
            let layer = ((-rng.random::<f64>().ln() * config.level_multiplier).floor() as usize)
                .min(31);
            graph.insert(ord, layer, config, &score)?;
        }

        Ok(graph)
    }

    fn insert(
        &mut self,
        ord: u32,
        node_layer: usize,
        config: &HnswConfig,
        score: &impl Fn(u32, u32) -> Result<f32>,
    ) -> Result<()> {
        self.nodes.push(HnswNode::new(node_layer));

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(ord);
            self.max_layer = node_layer;
            return Ok(());
        };

        let score_to = |other: u32| score(ord, other);

        // Greedy descent through layers above the node's own top layer
        let mut entry_points = vec![entry];
        let mut layer = self.max_layer;
        while layer > node_layer {
            let found = self.search_layer(&score_to, &entry_points, 1, layer, usize::MAX, None)?;
            if let Some(best) = found.first() {
                entry_points = vec![best.ord];
            }
            if layer == 0 {
                break;
            }
            layer -= 1;
        }

        // Connect on each layer from min(max_layer, node_layer) down to 0
        let mut layer = node_layer.min(self.max_layer);
        loop {
            let found = self.search_layer(
                &score_to,
                &entry_points,
                config.ef_construction,
                layer,
                usize::MAX,
                None,
            )?;

            let max_conn = if layer == 0 { config.m } else { config.m_upper };
            let selected: Vec<u32> = found.iter().take(max_conn).map(|c| c.ord).collect();

            for &neighbor in &selected {
                if !self.nodes[ord as usize].connections[layer].contains(&neighbor) {
                    self.nodes[ord as usize].connections[layer].push(neighbor);
                }
                let neighbor_node = &mut self.nodes[neighbor as usize];
                if layer <= neighbor_node.max_layer
                    && !neighbor_node.connections[layer].contains(&ord)
                {
                    neighbor_node.connections[layer].push(ord);
                }
            }

            for &neighbor in &selected {
                self.prune(neighbor, layer, max_conn, score)?;
            }

            entry_points = found.iter().map(|c| c.ord).collect();
            if entry_points.is_empty() {
                entry_points = vec![entry];
            }

            if layer == 0 {
                break;
            }
            layer -= 1;
        }

        if node_layer > self.max_layer {
            self.max_layer = node_layer;
            self.entry_point = Some(ord);
        }

        Ok(())
    }

    fn prune(
        &mut self,
        ord: u32,
        layer: usize,
        max_connections: usize,
        score: &impl Fn(u32, u32) -> Result<f32>,
    ) -> Result<()> {
        let connections = self.nodes[ord as usize].connections[layer].clone();
        if connections.len() <= max_connections {
            return Ok(());
        }

        let mut scored: Vec<Candidate> = Vec::with_capacity(connections.len());
        for neighbor in connections {
            scored.push(Candidate {
                score: score(ord, neighbor)?,
                ord: neighbor,
            });
        }
        scored.sort_by(|a, b| b.cmp(a));

        self.nodes[ord as usize].connections[layer] =
            scored.into_iter().take(max_connections).map(|c| c.ord).collect();
        Ok(())
    }

    /// Best-first search within one layer, stopping at `visited_limit`
    /// scored nodes. Returns candidates best-first.
    fn search_layer(
        &self,
        score_query: &impl Fn(u32) -> Result<f32>,
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited_limit: usize,
        visited_out: Option<&mut SearchBudget>,
    ) -> Result<Vec<Candidate>> {
        let mut local_budget = SearchBudget::new(visited_limit);
        let budget = match visited_out {
            Some(b) => b,
            None => &mut local_budget,
        };

        let mut visited: AHashSet<u32> = AHashSet::new();
        let mut to_explore: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();

        for &entry in entry_points {
            if !visited.insert(entry) {
                continue;
            }
            if !budget.consume() {
                break;
            }
            let candidate = Candidate {
                score: score_query(entry)?,
                ord: entry,
            };
            to_explore.push(candidate);
            results.push(Reverse(candidate));
        }

        while let Some(current) = to_explore.pop() {
            if results.len() >= ef {
                if let Some(Reverse(worst)) = results.peek() {
                    if current.score < worst.score {
                        break;
                    }
                }
            }

            for &neighbor in self.nodes[current.ord as usize].neighbors(layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                if !budget.consume() {
                    // Budget exhausted: stop exploring entirely
                    let mut out: Vec<Candidate> =
                        results.into_iter().map(|Reverse(c)| c).collect();
                    out.sort_by(|a, b| b.cmp(a));
                    return Ok(out);
                }

                let candidate = Candidate {
                    score: score_query(neighbor)?,
                    ord: neighbor,
                };

                if results.len() < ef {
                    to_explore.push(candidate);
                    results.push(Reverse(candidate));
                } else if let Some(Reverse(worst)) = results.peek() {
                    if candidate.score > worst.score {
                        results.pop();
                        results.push(Reverse(candidate));
                        to_explore.push(candidate);
                    }
                }
            }
        }

        let mut out: Vec<Candidate> = results.into_iter().map(|Reverse(c)| c).collect();
        out.sort_by(|a, b| b.cmp(a));
        Ok(out)
    }

    /// Approximate top-k search over the graph.
    ///
    /// `accept` filters result candidates (liveness); navigation still passes
    /// through filtered nodes so the graph stays connected. Every scored node
    /// counts against `visited_limit`.
    pub fn search(
        &self,
        score_query: impl Fn(u32) -> Result<f32>,
        k: usize,
        ef: usize,
        accept: Option<&dyn Fn(u32) -> bool>,
        visited_limit: usize,
    ) -> Result<GraphSearchResult> {
        let Some(entry) = self.entry_point else {
            return Ok(GraphSearchResult {
                neighbors: Vec::new(),
                visited: 0,
                incomplete: false,
            });
        };

        let mut budget = SearchBudget::new(visited_limit);

        // Greedy descent to layer 1
        let mut entry_points = vec![entry];
        let mut layer = self.max_layer;
        while layer > 0 {
            let found = self.search_layer(
                &score_query,
                &entry_points,
                1,
                layer,
                visited_limit,
                Some(&mut budget),
            )?;
            if let Some(best) = found.first() {
                entry_points = vec![best.ord];
            }
            if budget.exhausted() {
                break;
            }
            layer -= 1;
        }

        // Wide search on layer 0
        let found = self.search_layer(
            &score_query,
            &entry_points,
            ef.max(k),
            0,
            visited_limit,
            Some(&mut budget),
        )?;

        let neighbors: Vec<(u32, f32)> = found
            .into_iter()
            .filter(|c| accept.map(|f| f(c.ord)).unwrap_or(true))
            .take(k)
            .map(|c| (c.ord, c.score))
            .collect();

        Ok(GraphSearchResult {
            neighbors,
            visited: budget.used(),
            incomplete: budget.exhausted(),
        })
    }

    /// Number of nodes in the graph.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }
}

/// Counts scored nodes against the visited-node budget.
#[derive(Debug)]
struct SearchBudget {
    limit: usize,
    used: usize,
    exhausted: bool,
}

impl SearchBudget {
    fn new(limit: usize) -> Self {
        SearchBudget {
            limit,
            used: 0,
            exhausted: false,
        }
    }

    /// Try to spend one unit; false once the budget is gone.
    fn consume(&mut self) -> bool {
        if self.used >= self.limit {
            self.exhausted = true;
            return false;
        }
        self.used += 1;
        true
    }

    fn used(&self) -> usize {
        self.used
    }

    fn exhausted(&self) -> bool {
        self.exhausted
    }
}
