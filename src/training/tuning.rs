//! Hyperparameter grid search.
//!
//! Every combination of learning rate, hidden dimension and epoch count is
//! trained from the same base configuration. The dataset is loaded once and
//! shared by all runs.

use crate::core::Result;
use crate::graph::{self, Dataset};
use crate::training::config::TrainerConfig;
use crate::training::evaluate::ClassificationMetrics;
use crate::training::trainer::FeedbackTrainer;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Values to sweep; the cartesian product is trained.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParamGrid {
    pub learning_rates: Vec<f32>,
    pub hidden_dims: Vec<usize>,
    pub epochs: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            learning_rates: vec![0.01, 0.001, 0.0001],
            hidden_dims: vec![64, 128],
            epochs: vec![30],
        }
    }
}

/// One point of the grid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TuningParams {
    pub lr: f32,
    pub hidden_dim: usize,
    pub epochs: usize,
}

impl TuningParams {
    /// `base` with this point's values substituted.
    pub fn apply(&self, base: &TrainerConfig) -> TrainerConfig {
        TrainerConfig {
            lr: self.lr,
            hidden_dim: self.hidden_dim,
            epochs: self.epochs,
            ..base.clone()
        }
    }
}

impl ParamGrid {
    /// Grid points in learning-rate-major order.
    pub fn combinations(&self) -> Vec<TuningParams> {
        let mut points = Vec::with_capacity(self.len());
        for &lr in &self.learning_rates {
            for &hidden_dim in &self.hidden_dims {
                for &epochs in &self.epochs {
                    points.push(TuningParams {
                        lr,
                        hidden_dim,
                        epochs,
                    });
                }
            }
        }
        points
    }

    pub fn len(&self) -> usize {
        self.learning_rates.len() * self.hidden_dims.len() * self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of training one grid point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TuningRun {
    pub params: TuningParams,
    pub final_loss: Option<f32>,
    pub final_val_accuracy: Option<f32>,
    pub best_val_accuracy: Option<f32>,
    pub test: Option<ClassificationMetrics>,
}

/// Train every grid point on an already loaded dataset.
pub fn run_grid(base: &TrainerConfig, dataset: &Dataset, grid: &ParamGrid) -> Result<Vec<TuningRun>> {
    let points = grid.combinations();
    info!(combinations = points.len(), "starting grid search");

    let mut runs = Vec::with_capacity(points.len());
    for (i, params) in points.into_iter().enumerate() {
        info!(
            run = i + 1,
            of = grid.len(),
            lr = params.lr,
            hidden_dim = params.hidden_dim,
            epochs = params.epochs,
            "grid point"
        );
        let outcome = FeedbackTrainer::new(params.apply(base), dataset.clone())?.run()?;
        runs.push(TuningRun {
            params,
            final_loss: outcome.report.final_loss,
            final_val_accuracy: outcome.report.final_val_accuracy,
            best_val_accuracy: outcome.report.best_val_accuracy,
            test: outcome.evaluation.test,
        });
    }
    info!("grid search complete");
    Ok(runs)
}

/// Load the dataset named by `base` and run the grid over it.
pub fn tune(base: &TrainerConfig, grid: &ParamGrid) -> Result<Vec<TuningRun>> {
    base.validate()?;
    let dataset = graph::load(&base.data_path, base.dataset_name, base.split())?;
    run_grid(base, &dataset, grid)
}

/// Run with the highest final validation accuracy; earliest wins ties.
pub fn best_run(runs: &[TuningRun]) -> Option<&TuningRun> {
    runs.iter()
        .filter(|r| r.final_val_accuracy.is_some())
        .fold(None, |best: Option<&TuningRun>, run| match best {
            Some(b) if b.final_val_accuracy >= run.final_val_accuracy => best,
            _ => Some(run),
        })
}
