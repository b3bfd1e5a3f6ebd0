//! Graph Store Module
//!
//! The immutable transaction graph and the loaders that build it:
//! - CSR-indexed directed graph
//! - Elliptic and synthetic dataset readers
//! - Temporal and positional train/val/test masks

pub mod loader;
pub mod store;

pub use loader::{
    load, positional_split, temporal_split, Dataset, DatasetName, Masks, SplitParams,
};
pub use store::Graph;
