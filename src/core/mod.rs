//! Core utilities and common types for DGA-GNN.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
