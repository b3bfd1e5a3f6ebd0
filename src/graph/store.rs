//! Immutable directed transaction graph.
//!
//! Edges are kept in insertion order and indexed twice in compressed sparse
//! row form, once by destination (incoming) and once by source (outgoing),
//! so both the forward scatter and the backward gather walk contiguous
//! slices.

use crate::core::{Error, NodeId, Result};
use serde::{Deserialize, Serialize};

/// Directed graph over nodes `0..num_nodes`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Graph {
    num_nodes: usize,
    edges: Vec<(NodeId, NodeId)>,
    in_offsets: Vec<usize>,
    in_sources: Vec<NodeId>,
    out_offsets: Vec<usize>,
    out_targets: Vec<NodeId>,
}

impl Graph {
    /// Build a graph, rejecting edges that reference a node outside `0..num_nodes`.
    pub fn new(num_nodes: usize, edges: Vec<(NodeId, NodeId)>) -> Result<Self> {
        if let Some(&(src, dst)) = edges
            .iter()
            .find(|&&(src, dst)| src >= num_nodes || dst >= num_nodes)
        {
            return Err(Error::InvalidEdge {
                src,
                dst,
                num_nodes,
            });
        }

        let (in_offsets, in_sources) = build_csr(num_nodes, edges.iter().map(|&(s, d)| (d, s)));
        let (out_offsets, out_targets) = build_csr(num_nodes, edges.iter().copied());

        Ok(Self {
            num_nodes,
            edges,
            in_offsets,
            in_sources,
            out_offsets,
            out_targets,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// All edges as `(src, dst)` in insertion order.
    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    /// Sources of the edges that end at `node`.
    pub fn in_neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.in_sources[self.in_offsets[node]..self.in_offsets[node + 1]]
    }

    /// Destinations of the edges that start at `node`.
    pub fn out_neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.out_targets[self.out_offsets[node]..self.out_offsets[node + 1]]
    }

    pub fn in_degree(&self, node: NodeId) -> usize {
        self.in_offsets[node + 1] - self.in_offsets[node]
    }

    pub fn out_degree(&self, node: NodeId) -> usize {
        self.out_offsets[node + 1] - self.out_offsets[node]
    }
}

/// Counting-sort `(key, value)` pairs into offsets and a flat value array.
fn build_csr(
    num_nodes: usize,
    pairs: impl Iterator<Item = (NodeId, NodeId)> + Clone,
) -> (Vec<usize>, Vec<NodeId>) {
    let mut offsets = vec![0usize; num_nodes + 1];
    for (key, _) in pairs.clone() {
        offsets[key + 1] += 1;
    }
    for i in 0..num_nodes {
        offsets[i + 1] += offsets[i];
    }

    let mut cursor = offsets.clone();
    let mut values = vec![0; offsets[num_nodes]];
    for (key, value) in pairs {
        values[cursor[key]] = value;
        cursor[key] += 1;
    }
    (offsets, values)
}
