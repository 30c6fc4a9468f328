//! YAML schema definitions for a cross-validated training run

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::features::FeatureSpec;
use crate::io::ModelFormat;
use crate::model::ModelSpec;

/// Complete run specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Input tables
    pub data: DataConfig,

    /// Feature pipeline
    #[serde(default)]
    pub features: FeatureSpec,

    /// Classifier per fold
    pub model: ModelSpec,

    /// Optimizer configuration
    pub optimizer: OptimSpec,

    /// Training hyperparameters
    #[serde(default)]
    pub training: TrainingParams,

    /// Cross-validation scheme
    #[serde(default)]
    pub cv: CvParams,

    /// Result directory layout
    #[serde(default)]
    pub output: OutputParams,

    /// Compute device
    #[serde(default)]
    pub device: DeviceParams,
}

/// Data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Training table (`path`, `label`)
    pub train: PathBuf,

    /// Test table (`path`)
    pub test: PathBuf,

    /// Submission template, one row per test example
    pub submission: PathBuf,

    /// Directory the table paths are relative to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Number of classes
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
}

/// Optimizer specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimSpec {
    /// Optimizer name: "adam" | "sgd"
    pub name: String,

    /// Learning rate
    pub lr: f32,

    /// Optimizer-specific parameters (beta1, beta2, eps, momentum)
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Maximum epochs per fold
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Epochs without validation improvement before stopping
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Fixed batch size; probed on the device when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Upper bound for the batch size probe
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Data loading threads
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Gradient clipping threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grad_clip: Option<f32>,

    /// Log training progress every N steps
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            patience: default_patience(),
            batch_size: None,
            max_batch_size: default_max_batch_size(),
            num_workers: default_num_workers(),
            grad_clip: None,
            log_interval: default_log_interval(),
        }
    }
}

/// Stratified k-fold parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvParams {
    #[serde(default = "default_k")]
    pub k: usize,

    /// Seeds the split, the shuffles and the model initialisation
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for CvParams {
    fn default() -> Self {
        Self {
            k: default_k(),
            seed: default_seed(),
        }
    }
}

/// Where and how results are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParams {
    /// Parent of the run directories
    #[serde(default = "default_result_path")]
    pub result_path: PathBuf,

    /// Format of the per-fold model artifact
    #[serde(default = "default_model_format")]
    pub model_format: ModelFormat,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            result_path: default_result_path(),
            model_format: default_model_format(),
        }
    }
}

/// Device limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceParams {
    /// Peak working memory per step in megabytes (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<usize>,
}

fn default_num_classes() -> usize {
    6
}

fn default_epochs() -> usize {
    100
}

fn default_patience() -> usize {
    10
}

fn default_max_batch_size() -> usize {
    crate::train::probe::DEFAULT_CEILING
}

fn default_num_workers() -> usize {
    4
}

fn default_log_interval() -> usize {
    10
}

fn default_k() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_result_path() -> PathBuf {
    PathBuf::from("./result")
}

fn default_model_format() -> ModelFormat {
    ModelFormat::Json
}
