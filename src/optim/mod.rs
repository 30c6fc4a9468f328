//! Optimizers for the fold models

mod adam;
mod optimizer;
mod sgd;

pub use adam::Adam;
pub use optimizer::{clip_grad_norm, Optimizer};
pub use sgd::SGD;
