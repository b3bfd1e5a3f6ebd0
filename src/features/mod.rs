//! Feature Engineering Module
//!
//! Optional pre-processing applied before model input:
//! - Decision-tree binning of continuous features
//! - Degree and PageRank centrality

pub mod binning;
pub mod topology;

pub use binning::{apply, bin_index, fit, BinThresholds};
pub use topology::{centrality, degree_centrality, pagerank, CentralityMetric, PageRankConfig};
