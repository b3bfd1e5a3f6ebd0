//! Topological node features.
//!
//! Centrality scores computed over the transaction graph, one per node,
//! suitable for appending to the feature matrix.

use crate::core::{Error, Result};
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported centrality measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CentralityMetric {
    /// `(in + out) / (n - 1)`
    Degree,
    /// Power-iteration PageRank with uniform teleport
    PageRank,
}

impl std::str::FromStr for CentralityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "degree" => Ok(Self::Degree),
            "pagerank" => Ok(Self::PageRank),
            other => Err(Error::UnknownMetric(other.to_string())),
        }
    }
}

impl std::fmt::Display for CentralityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CentralityMetric::Degree => write!(f, "degree"),
            CentralityMetric::PageRank => write!(f, "pagerank"),
        }
    }
}

/// PageRank parameters.
#[derive(Debug, Clone, Copy)]
pub struct PageRankConfig {
    /// Probability of following a link rather than teleporting
    pub damping: f64,
    pub max_iterations: usize,
    /// Per-node tolerance; the run stops once the L1 change is below `n * tolerance`
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Score every node with `metric`.
pub fn centrality(graph: &Graph, metric: CentralityMetric) -> Result<Vec<f64>> {
    match metric {
        CentralityMetric::Degree => Ok(degree_centrality(graph)),
        CentralityMetric::PageRank => pagerank(graph, PageRankConfig::default()),
    }
}

/// Total degree normalised by the largest possible degree in a simple graph.
pub fn degree_centrality(graph: &Graph) -> Vec<f64> {
    let n = graph.num_nodes();
    if n <= 1 {
        return vec![1.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    (0..n)
        .map(|v| (graph.in_degree(v) + graph.out_degree(v)) as f64 * scale)
        .collect()
}

/// PageRank over directed edges. Mass on nodes without outgoing edges is
/// spread uniformly. Scores sum to 1.
pub fn pagerank(graph: &Graph, config: PageRankConfig) -> Result<Vec<f64>> {
    let n = graph.num_nodes();
    if n == 0 {
        return Ok(Vec::new());
    }

    let uniform = 1.0 / n as f64;
    let mut scores = vec![uniform; n];
    let mut next = vec![0.0; n];

    for iteration in 1..=config.max_iterations {
        let dangling: f64 = (0..n)
            .filter(|&v| graph.out_degree(v) == 0)
            .map(|v| scores[v])
            .sum();
        let base = config.damping * dangling * uniform + (1.0 - config.damping) * uniform;
        next.fill(base);
        for (v, &score) in scores.iter().enumerate() {
            let out = graph.out_neighbors(v);
            if out.is_empty() {
                continue;
            }
            let share = config.damping * score / out.len() as f64;
            for &w in out {
                next[w] += share;
            }
        }

        let change: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        std::mem::swap(&mut scores, &mut next);
        if change < n as f64 * config.tolerance {
            debug!(iteration, "pagerank converged");
            return Ok(scores);
        }
    }

    Err(Error::ConvergenceFailed {
        iterations: config.max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undirected 5-node star around node 0, stored as edges in both directions.
    fn star() -> Graph {
        let mut edges = Vec::new();
        for leaf in 1..5 {
            edges.push((0, leaf));
            edges.push((leaf, 0));
        }
        Graph::new(5, edges).unwrap()
    }

    #[test]
    fn test_degree_centrality_star() {
        let scores = centrality(&star(), CentralityMetric::Degree).unwrap();
        for leaf in 1..5 {
            assert!(scores[0] > scores[leaf]);
        }
        // Hub: 4 in + 4 out over n - 1 = 4.
        assert!((scores[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_pagerank_star() {
        let scores = centrality(&star(), CentralityMetric::PageRank).unwrap();
        for leaf in 1..5 {
            assert!(scores[0] > scores[leaf], "hub {} leaf {}", scores[0], scores[leaf]);
        }
        let total: f64 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pagerank_cycle_is_uniform() {
        let g = Graph::new(3, vec![(0, 1), (1, 2), (2, 0)]).unwrap();
        let scores = pagerank(&g, PageRankConfig::default()).unwrap();
        for s in scores {
            assert!((s - 1.0 / 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_pagerank_dangling_nodes() {
        // 0 -> 1, 0 -> 2; both leaves dangle.
        let g = Graph::new(3, vec![(0, 1), (0, 2)]).unwrap();
        let scores = pagerank(&g, PageRankConfig::default()).unwrap();
        assert!(scores[1] > scores[0]);
        assert!((scores.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pagerank_non_convergence() {
        let g = Graph::new(2, vec![(0, 1), (1, 0), (0, 0)]).unwrap();
        let config = PageRankConfig {
            max_iterations: 1,
            ..Default::default()
        };
        assert!(matches!(
            pagerank(&g, config),
            Err(Error::ConvergenceFailed { iterations: 1 })
        ));
    }

    #[test]
    fn test_unknown_metric() {
        let err = "invalid_metric".parse::<CentralityMetric>().unwrap_err();
        assert!(matches!(err, Error::UnknownMetric(_)));
        assert_eq!("pagerank".parse::<CentralityMetric>().unwrap(), CentralityMetric::PageRank);
    }

    #[test]
    fn test_small_graphs() {
        let empty = Graph::new(0, Vec::new()).unwrap();
        assert!(degree_centrality(&empty).is_empty());
        assert!(pagerank(&empty, PageRankConfig::default()).unwrap().is_empty());

        let single = Graph::new(1, Vec::new()).unwrap();
        assert_eq!(degree_centrality(&single), vec![1.0]);
    }
}
