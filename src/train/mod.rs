//! Training loop, batch size probing and per-fold orchestration
//!
//! - [`Trainer`] drives a [`Classifier`](crate::model::Classifier) over data
//!   loaders with callbacks, gradient clipping and best-weight restoration
//! - [`BatchSizeProber`] finds the largest batch that fits the device
//! - [`FoldRunner`] trains one fold from raw examples to predictions
//!
//! # Example
//!
//! ```no_run
//! use foldwise::model::{build_model, ModelSpec};
//! use foldwise::optim::Adam;
//! use foldwise::train::{CrossEntropyLoss, TrainConfig, Trainer};
//!
//! let model = build_model(&ModelSpec::default(), Some(40), 6, 0).unwrap();
//! let optimizer = Adam::default_params(1e-3);
//! let mut trainer = Trainer::new(
//!     model,
//!     Box::new(optimizer),
//!     Box::new(CrossEntropyLoss),
//!     TrainConfig::default(),
//! );
//!
//! // let result = trainer.train(100, &train_loader, Some(&valid_loader), &device)?;
//! ```

pub mod callback;
mod config;
mod fold;
mod loss;
pub mod probe;
mod trainer;

pub use callback::{
    CallbackAction, CallbackContext, CallbackManager, EarlyStopping, ProgressCallback,
    TrainerCallback,
};
pub use config::{MetricsTracker, TrainConfig};
pub use fold::{FoldJob, FoldOutcome, FoldRunner, FoldSettings, FoldState, RunContext};
pub use loss::{softmax, CrossEntropyLoss, LossFn, LossOutput};
pub use probe::BatchSizeProber;
pub use trainer::{TrainResult, Trainer};
