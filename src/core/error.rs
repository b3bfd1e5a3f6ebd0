//! Error types for DGA-GNN.

use thiserror::Error;

/// Result type alias for DGA-GNN operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading data, building models or training.
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Unknown centrality metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown compute device: {0}")]
    UnknownDevice(String),

    #[error("Unknown optimizer: {0}")]
    UnknownOptimizer(String),

    // Model errors
    #[error("Node {node} has group id {group}, but only {num_groups} groups are configured")]
    InvalidGroup {
        node: usize,
        group: u32,
        num_groups: usize,
    },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Node {node} has label {label}, but only {num_classes} classes are configured")]
    InvalidLabel {
        node: usize,
        label: u32,
        num_classes: usize,
    },

    #[error("The {0} mask selects no nodes")]
    EmptyMask(&'static str),

    // Graph errors
    #[error("Edge {src} -> {dst} references a node outside 0..{num_nodes}")]
    InvalidEdge {
        src: usize,
        dst: usize,
        num_nodes: usize,
    },

    #[error("PageRank did not converge within {iterations} iterations")]
    ConvergenceFailed { iterations: usize },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Data errors
    #[error("Malformed data: {0}")]
    DataFormat(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::SerializationError(err.to_string())
        } else {
            Error::DeserializationError(err.to_string())
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::DataFormat(err.to_string())
    }
}
