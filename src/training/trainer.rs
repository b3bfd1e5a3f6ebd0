//! Feedback trainer.
//!
//! Each epoch runs a full-batch forward pass with the current group vector,
//! takes one optimizer step on the masked training loss, then replaces the
//! group vector with the argmax predictions of that forward pass:
//!
//! ```text
//! Initialized -> (Forward -> Backward -> Regroup) x epochs -> Done
//! ```
//!
//! Regrouping covers every node, labeled or not, and never feeds gradients
//! back into the model.

use crate::core::{Error, GroupId, Result};
use crate::gnn::{accuracy, cross_entropy, predictions, Adam, DgaNetwork, Optimizer, Sgd};
use crate::graph::{self, Dataset};
use crate::monitoring::{EpochRecord, MetricsCollector, TrainingReport};
use crate::training::config::{OptimizerKind, TrainerConfig};
use crate::training::evaluate::{evaluate, ClassificationMetrics};
use crate::training::groups::{GroupHistory, GroupLabels};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Phase of the feedback loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainerState {
    Initialized,
    Forward,
    Backward,
    Regroup,
    Done,
}

/// Scores of the final model on each split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evaluation {
    pub train: Option<ClassificationMetrics>,
    pub val: Option<ClassificationMetrics>,
    pub test: Option<ClassificationMetrics>,
}

/// Everything a finished run produces.
#[derive(Clone, Debug)]
pub struct TrainingOutcome {
    pub model: DgaNetwork,
    /// `epochs + 1` group snapshots, the first all zeros
    pub history: GroupHistory,
    pub report: TrainingReport,
    /// Final model scored with the last group vector
    pub evaluation: Evaluation,
}

/// Drives the forward / backward / regroup loop over one dataset.
pub struct FeedbackTrainer {
    config: TrainerConfig,
    dataset: Dataset,
    model: DgaNetwork,
    optimizer: Box<dyn Optimizer>,
    groups: GroupLabels,
    history: GroupHistory,
    metrics: MetricsCollector,
    state: TrainerState,
    epoch: usize,
}

impl FeedbackTrainer {
    /// Build a trainer for `dataset`. The configuration must agree with the
    /// dataset's feature width and label range, and the training mask must
    /// select at least one node.
    pub fn new(config: TrainerConfig, dataset: Dataset) -> Result<Self> {
        config.validate()?;
        if dataset.num_features() != config.in_feats {
            return Err(Error::ShapeMismatch {
                context: "in_feats vs dataset feature width",
                expected: config.in_feats,
                actual: dataset.num_features(),
            });
        }
        if let Some((node, &label)) = dataset
            .labels
            .iter()
            .enumerate()
            .find(|&(_, &label)| label as usize >= config.num_classes)
        {
            return Err(Error::InvalidLabel {
                node,
                label,
                num_classes: config.num_classes,
            });
        }
        if !dataset.masks.train().iter().any(|&m| m) {
            return Err(Error::EmptyMask("train"));
        }

        let device = config.device.resolve();
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model = DgaNetwork::new(config.network_shape(), &mut rng)?;
        let optimizer: Box<dyn Optimizer> = match config.optimizer {
            OptimizerKind::Adam => Box::new(Adam::new(config.lr)),
            OptimizerKind::Sgd => Box::new(Sgd::new(config.lr)),
        };

        let groups = GroupLabels::zeros(dataset.num_nodes());
        let mut history = GroupHistory::new();
        history.push(groups.clone());

        let metrics = MetricsCollector::new();
        info!(
            run_id = %metrics.run_id(),
            nodes = dataset.num_nodes(),
            parameters = model.parameter_count(),
            epochs = config.epochs,
            lr = config.lr,
            optimizer = ?config.optimizer,
            device = ?device,
            "trainer initialised"
        );

        Ok(Self {
            config,
            dataset,
            model,
            optimizer,
            groups,
            history,
            metrics,
            state: TrainerState::Initialized,
            epoch: 0,
        })
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// Epochs completed so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn model(&self) -> &DgaNetwork {
        &self.model
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Group vector the next forward pass will use.
    pub fn groups(&self) -> &GroupLabels {
        &self.groups
    }

    pub fn history(&self) -> &GroupHistory {
        &self.history
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Run one full epoch and return its metrics. Fails once every
    /// configured epoch has run; the last one leaves the trainer `Done`.
    pub fn run_epoch(&mut self) -> Result<EpochRecord> {
        if self.state == TrainerState::Done || self.epoch >= self.config.epochs {
            return Err(Error::InvalidConfig(format!(
                "training already finished after {} epochs",
                self.epoch
            )));
        }
        let started = Instant::now();
        let graph = &self.dataset.graph;
        let features = &self.dataset.features;
        let labels = &self.dataset.labels;
        let masks = &self.dataset.masks;

        advance(&mut self.state, TrainerState::Forward, self.epoch);
        let cache = self
            .model
            .forward_cached(graph, features, self.groups.as_slice())?;
        let loss = cross_entropy(&cache.logits, labels, masks.train())?;
        let val_accuracy = accuracy(&cache.logits, labels, masks.val())?;

        advance(&mut self.state, TrainerState::Backward, self.epoch);
        let grads = self.model.backward(
            graph,
            features,
            self.groups.as_slice(),
            &cache,
            &loss.grad_logits,
        )?;
        self.optimizer
            .step(self.model.parameters_mut(), &grads.slices())?;

        advance(&mut self.state, TrainerState::Regroup, self.epoch);
        let next = GroupLabels::from_predictions(predictions(&cache.logits));
        let group_changes = next.diff_count(&self.groups);
        let group_sizes = (0..self.config.num_groups)
            .map(|g| next.count(g as GroupId))
            .collect();
        self.history.push(next.clone());
        self.groups = next;
        self.epoch += 1;

        let record = EpochRecord {
            epoch: self.epoch,
            loss: loss.loss,
            val_accuracy,
            group_changes,
            group_sizes,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            epoch = record.epoch,
            loss = record.loss,
            val_accuracy = ?record.val_accuracy,
            group_changes = record.group_changes,
            "epoch complete"
        );
        self.metrics.record(record.clone());
        if self.epoch == self.config.epochs {
            advance(&mut self.state, TrainerState::Done, self.epoch);
        }
        Ok(record)
    }

    /// Run every remaining epoch, then score the final model.
    pub fn run(mut self) -> Result<TrainingOutcome> {
        while self.state != TrainerState::Done && self.epoch < self.config.epochs {
            self.run_epoch()?;
        }
        if self.state != TrainerState::Done {
            advance(&mut self.state, TrainerState::Done, self.epoch);
        }

        let evaluation = self.evaluate()?;
        let report = self.metrics.finish();
        info!(
            run_id = %report.run_id,
            epochs = report.epochs,
            final_loss = ?report.final_loss,
            best_val_accuracy = ?report.best_val_accuracy,
            test_f1 = ?evaluation.test.map(|m| m.f1),
            "training finished"
        );
        Ok(TrainingOutcome {
            model: self.model,
            history: self.history,
            report,
            evaluation,
        })
    }

    /// Score the current model on every split using the current group vector.
    pub fn evaluate(&self) -> Result<Evaluation> {
        let predicted = self.model.predict(
            &self.dataset.graph,
            &self.dataset.features,
            self.groups.as_slice(),
        )?;
        let labels = &self.dataset.labels;
        let masks = &self.dataset.masks;
        Ok(Evaluation {
            train: evaluate(&predicted, labels, masks.train())?,
            val: evaluate(&predicted, labels, masks.val())?,
            test: evaluate(&predicted, labels, masks.test())?,
        })
    }
}

fn advance(state: &mut TrainerState, next: TrainerState, epoch: usize) {
    debug!(from = ?*state, to = ?next, epoch, "trainer state");
    *state = next;
}

/// Load the configured dataset and train on it.
pub fn train(config: &TrainerConfig) -> Result<TrainingOutcome> {
    config.validate()?;
    let dataset = graph::load(&config.data_path, config.dataset_name, config.split())?;
    FeedbackTrainer::new(config.clone(), dataset)?.run()
}
