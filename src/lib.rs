//! # Foldwise: cross-validated audio classification
//!
//! Foldwise trains one classifier per stratified fold of a labelled audio
//! table, sums the folds' test probabilities into an ensemble prediction and
//! keeps every run resumable: a run directory records which folds completed,
//! so an interrupted run continues without retraining or double counting.
//!
//! ## Architecture
//!
//! - **config**: Declarative YAML configuration and CLI
//! - **cv**: Stratified k-fold splitting
//! - **features**: WAV decoding, MFCC and framed waveform features
//! - **data**: Input tables, datasets, scalers and batching
//! - **model**: Linear and MLP classifiers with manual backpropagation
//! - **optim**: Optimizers (SGD, Adam)
//! - **train**: Training loop, callbacks, batch size probing, fold runner
//! - **ensemble**: Run manifest, per-fold predictions, ensemble outputs
//! - **io**: Model saving and loading (JSON, YAML, SafeTensors)
//! - **run**: Run orchestration

pub mod config;
pub mod cv;
pub mod data;
pub mod device;
pub mod ensemble;
pub mod features;
pub mod io;
pub mod logging;
pub mod model;
pub mod optim;
pub mod run;
pub mod train;

pub mod error;
mod tensor;

// Re-export commonly used types
pub use device::Device;
pub use error::{Error, Result};
pub use tensor::Tensor;
