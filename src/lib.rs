//! # DGA-GNN - Dynamic Group-Aware Graph Neural Network
//!
//! Node classification for transaction fraud detection:
//! - **graph**: transaction graph store, dataset loaders and splits
//! - **gnn**: DGA layers, the two-layer network, loss and optimizers
//! - **training**: the epoch-wise feedback loop that regroups nodes by their
//!   predicted class
//! - **features**: supervised binning and centrality features
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dga_gnn::graph::DatasetName;
//! use dga_gnn::training::{train, TrainerConfig};
//!
//! fn main() -> dga_gnn::Result<()> {
//!     let config = TrainerConfig {
//!         data_path: "data/elliptic".into(),
//!         dataset_name: DatasetName::Elliptic,
//!         epochs: 30,
//!         ..Default::default()
//!     };
//!     let outcome = train(&config)?;
//!     println!("final groups: {:?}", outcome.history.last());
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod features;
pub mod gnn;
pub mod graph;
pub mod monitoring;
pub mod training;

pub use core::error::{Error, Result};
