//! Trainer configuration.
//!
//! [`TrainerConfig`] is the flat, explicit struct handed to the trainer.
//! [`ExperimentFile`] is the nested on-disk layout (`data` / `model` /
//! `training` sections) that flattens into it.

use crate::core::{Error, Result};
use crate::gnn::NetworkShape;
use crate::graph::{DatasetName, SplitParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Compute device for training. Parses `cpu`, `gpu`, `cuda` and `cuda:<n>`
/// both from strings and from experiment files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ComputeDevice {
    Cpu,
    Gpu,
}

impl Default for ComputeDevice {
    fn default() -> Self {
        Self::Cpu
    }
}

impl ComputeDevice {
    /// Device that will actually run the computation. Only CPU kernels exist,
    /// so a GPU request falls back to CPU.
    pub fn resolve(self) -> ComputeDevice {
        if self == ComputeDevice::Gpu {
            warn!("GPU requested but not available, training on CPU");
        }
        ComputeDevice::Cpu
    }
}

impl std::str::FromStr for ComputeDevice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            other if other.starts_with("cuda:") => Ok(Self::Gpu),
            other => Err(Error::UnknownDevice(other.to_string())),
        }
    }
}

impl TryFrom<String> for ComputeDevice {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Optimizer family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::Adam
    }
}

impl std::str::FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            other => Err(Error::UnknownOptimizer(other.to_string())),
        }
    }
}

/// Configuration for a feedback training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Directory containing the dataset files
    pub data_path: PathBuf,
    /// Which dataset layout to read
    pub dataset_name: DatasetName,
    /// First time step that is no longer training data
    pub train_split_step: i64,
    /// First time step that is test data
    pub val_split_step: i64,
    /// Input feature width
    pub in_feats: usize,
    /// Hidden dimension of both DGA layers
    pub hidden_dim: usize,
    /// Number of output classes
    pub num_classes: usize,
    /// Number of neighbor transforms per layer
    pub num_groups: usize,
    /// Learning rate
    pub lr: f32,
    /// Number of epochs; no early stopping
    pub epochs: usize,
    /// Requested compute device
    pub device: ComputeDevice,
    /// Optimizer family
    pub optimizer: OptimizerKind,
    /// Seed for parameter initialisation; random when unset
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data"),
            dataset_name: DatasetName::Test,
            train_split_step: 35,
            val_split_step: 42,
            in_feats: 165,
            hidden_dim: 64,
            num_classes: 2,
            num_groups: 2,
            lr: 0.01,
            epochs: 100,
            device: ComputeDevice::Cpu,
            optimizer: OptimizerKind::Adam,
            seed: None,
        }
    }
}

impl TrainerConfig {
    /// Read a nested experiment file and flatten it.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(ExperimentFile::load(path)?.into_trainer_config())
    }

    pub fn split(&self) -> SplitParams {
        SplitParams {
            train_split_step: self.train_split_step,
            val_split_step: self.val_split_step,
        }
    }

    pub fn network_shape(&self) -> NetworkShape {
        NetworkShape {
            in_feats: self.in_feats,
            hidden_dim: self.hidden_dim,
            num_classes: self.num_classes,
            num_groups: self.num_groups,
        }
    }

    /// Reject configurations that cannot produce a valid run.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("in_feats", self.in_feats),
            ("hidden_dim", self.hidden_dim),
            ("num_classes", self.num_classes),
            ("num_groups", self.num_groups),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        if self.num_groups < self.num_classes {
            return Err(Error::InvalidConfig(format!(
                "num_groups ({}) must be at least num_classes ({}): predicted classes become group ids",
                self.num_groups, self.num_classes
            )));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be a positive number, got {}",
                self.lr
            )));
        }
        if self.train_split_step > self.val_split_step {
            return Err(Error::InvalidConfig(format!(
                "train_split_step {} is after val_split_step {}",
                self.train_split_step, self.val_split_step
            )));
        }
        Ok(())
    }
}

/// `data` section of an experiment file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub path: PathBuf,
    pub dataset_name: DatasetName,
    pub train_split_step: i64,
    pub val_split_step: i64,
}

/// `model` section of an experiment file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub in_feats: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
    pub num_groups: usize,
}

/// `training` section of an experiment file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub lr: f32,
    pub epochs: usize,
    pub device: ComputeDevice,
    pub optimizer: OptimizerKind,
    pub seed: Option<u64>,
}

impl Default for DataSection {
    fn default() -> Self {
        let d = TrainerConfig::default();
        Self {
            path: d.data_path,
            dataset_name: d.dataset_name,
            train_split_step: d.train_split_step,
            val_split_step: d.val_split_step,
        }
    }
}

impl Default for ModelSection {
    fn default() -> Self {
        let d = TrainerConfig::default();
        Self {
            in_feats: d.in_feats,
            hidden_dim: d.hidden_dim,
            num_classes: d.num_classes,
            num_groups: d.num_groups,
        }
    }
}

impl Default for TrainingSection {
    fn default() -> Self {
        let d = TrainerConfig::default();
        Self {
            lr: d.lr,
            epochs: d.epochs,
            device: d.device,
            optimizer: d.optimizer,
            seed: d.seed,
        }
    }
}

/// Nested experiment description as stored on disk (JSON).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentFile {
    pub data: DataSection,
    pub model: ModelSection,
    pub training: TrainingSection,
}

impl ExperimentFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn into_trainer_config(self) -> TrainerConfig {
        TrainerConfig {
            data_path: self.data.path,
            dataset_name: self.data.dataset_name,
            train_split_step: self.data.train_split_step,
            val_split_step: self.data.val_split_step,
            in_feats: self.model.in_feats,
            hidden_dim: self.model.hidden_dim,
            num_classes: self.model.num_classes,
            num_groups: self.model.num_groups,
            lr: self.training.lr,
            epochs: self.training.epochs,
            device: self.training.device,
            optimizer: self.training.optimizer,
            seed: self.training.seed,
        }
    }
}
