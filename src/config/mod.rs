//! Declarative YAML configuration
//!
//! A run is described by one YAML file: input tables, feature pipeline,
//! classifier, optimizer and cross-validation scheme.
//!
//! # Example
//!
//! ```yaml
//! data:
//!   train: train.csv
//!   test: test.csv
//!   submission: sample_submission.csv
//!   num_classes: 6
//!
//! features:
//!   kind: spectral
//!   n_mfcc: 20
//!
//! model:
//!   kind: mlp
//!   hidden_size: 64
//!
//! optimizer:
//!   name: adam
//!   lr: 1e-3
//!
//! cv:
//!   k: 5
//!   seed: 42
//! ```

mod builder;
mod cli;
mod schema;
mod train;
mod validate;

#[cfg(test)]
mod tests;


pub use builder::{build_device, build_fold_settings, build_optimizer};
pub use cli::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, TrainArgs, ValidateArgs,
};
pub use schema::{
    CvParams, DataConfig, DeviceParams, OptimSpec, OutputParams, RunSpec, TrainingParams,
};
pub use train::{load_config, parse_config, train_from_yaml};
pub use validate::{validate_config, ValidationError};
