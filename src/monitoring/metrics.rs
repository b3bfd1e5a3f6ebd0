//! Per-epoch training metrics.
//!
//! A [`MetricsCollector`] lives for one training run and accumulates an
//! [`EpochRecord`] per epoch. [`MetricsCollector::finish`] turns it into a
//! serializable [`TrainingReport`].

use crate::core::{now, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Metrics for a single epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    /// Masked cross-entropy on the training nodes
    pub loss: f32,
    /// Accuracy on the validation nodes; `None` when the mask is empty
    pub val_accuracy: Option<f32>,
    /// Nodes whose group changed in this epoch's regroup
    pub group_changes: usize,
    /// Node count per group after regrouping, indexed by group id
    pub group_sizes: Vec<usize>,
    /// Wall-clock time of the epoch in milliseconds
    pub duration_ms: f64,
}

/// Collects epoch records for one run.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    run_id: Uuid,
    started_at: Timestamp,
    records: Vec<EpochRecord>,
}

impl MetricsCollector {
    /// Start collecting for a new run.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: now(),
            records: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Epoch with the highest validation accuracy; earliest wins ties.
    pub fn best_val_accuracy(&self) -> Option<(usize, f32)> {
        self.records
            .iter()
            .filter_map(|r| r.val_accuracy.map(|acc| (r.epoch, acc)))
            .fold(None, |best, (epoch, acc)| match best {
                Some((_, b)) if b >= acc => best,
                _ => Some((epoch, acc)),
            })
    }

    /// Mean epoch duration.
    pub fn mean_epoch_time(&self) -> Duration {
        if self.records.is_empty() {
            return Duration::ZERO;
        }
        let total: f64 = self.records.iter().map(|r| r.duration_ms).sum();
        Duration::from_secs_f64(total / self.records.len() as f64 / 1000.0)
    }

    /// Close the run and produce its report.
    pub fn finish(self) -> TrainingReport {
        let best = self.best_val_accuracy();
        let last = self.records.last();
        TrainingReport {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: now(),
            epochs: self.records.len(),
            final_loss: last.map(|r| r.loss),
            final_val_accuracy: last.and_then(|r| r.val_accuracy),
            best_epoch: best.map(|(epoch, _)| epoch),
            best_val_accuracy: best.map(|(_, acc)| acc),
            records: self.records,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a finished training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub epochs: usize,
    pub final_loss: Option<f32>,
    pub final_val_accuracy: Option<f32>,
    pub best_epoch: Option<usize>,
    pub best_val_accuracy: Option<f32>,
    pub records: Vec<EpochRecord>,
}

impl TrainingReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
