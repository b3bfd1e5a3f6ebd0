//! Monitoring Module
//!
//! Observability for training runs:
//! - Structured logging setup
//! - Per-epoch metrics and run reports

pub mod logging;
pub mod metrics;

pub use logging::{init as init_logging, LogFormat, LogLevel, LoggerConfig};
pub use metrics::{EpochRecord, MetricsCollector, TrainingReport};
