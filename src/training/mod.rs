//! Training Module
//!
//! The epoch-wise feedback loop and everything around it:
//! - Configuration and experiment files
//! - Group assignments and their history
//! - Evaluation, checkpoints and grid search

pub mod checkpoint;
pub mod config;
pub mod evaluate;
pub mod groups;
pub mod trainer;
pub mod tuning;

pub use checkpoint::{load_history, load_model, save_history, save_model};
pub use config::{ComputeDevice, ExperimentFile, OptimizerKind, TrainerConfig};
pub use evaluate::{evaluate, ClassificationMetrics, FRAUD_CLASS};
pub use groups::{GroupHistory, GroupLabels};
pub use trainer::{train, Evaluation, FeedbackTrainer, TrainerState, TrainingOutcome};
pub use tuning::{best_run, run_grid, tune, ParamGrid, TuningParams, TuningRun};
