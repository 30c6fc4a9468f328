//! Configuration validation

use super::schema::RunSpec;
use crate::features::FeatureSpec;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Training table does not exist: {0}")]
    TrainTableNotFound(String),

    #[error("Test table does not exist: {0}")]
    TestTableNotFound(String),

    #[error("Submission template does not exist: {0}")]
    SubmissionNotFound(String),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid max batch size: {0} (must be > 0)")]
    InvalidMaxBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid patience: {0} (must be > 0)")]
    InvalidPatience(usize),

    #[error("Invalid worker count: {0} (must be > 0)")]
    InvalidWorkers(usize),

    #[error("Invalid optimizer: {0} (must be one of: adam, sgd)")]
    InvalidOptimizer(String),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid fold count: {0} (must be >= 2)")]
    InvalidFolds(usize),

    #[error("Invalid class count: {0} (must be >= 2)")]
    InvalidClasses(usize),

    #[error("Invalid {kind} feature parameters: {reason}")]
    InvalidFeatures { kind: &'static str, reason: String },
}

/// Validate a run specification
///
/// Checks:
/// - Input tables exist
/// - Numeric values are in valid ranges
/// - Feature parameters are consistent
pub fn validate_config(spec: &RunSpec) -> Result<(), ValidationError> {
    // Input tables (skipped in tests where files may not exist)
    #[cfg(not(test))]
    {
        if !spec.data.train.exists() {
            return Err(ValidationError::TrainTableNotFound(
                spec.data.train.display().to_string(),
            ));
        }
        if !spec.data.test.exists() {
            return Err(ValidationError::TestTableNotFound(
                spec.data.test.display().to_string(),
            ));
        }
        if !spec.data.submission.exists() {
            return Err(ValidationError::SubmissionNotFound(
                spec.data.submission.display().to_string(),
            ));
        }
    }

    if spec.data.num_classes < 2 {
        return Err(ValidationError::InvalidClasses(spec.data.num_classes));
    }

    if spec.cv.k < 2 {
        return Err(ValidationError::InvalidFolds(spec.cv.k));
    }

    if spec.optimizer.lr <= 0.0 {
        return Err(ValidationError::InvalidLearningRate(spec.optimizer.lr));
    }

    let valid_optimizers = ["adam", "sgd"];
    if !valid_optimizers.contains(&spec.optimizer.name.to_lowercase().as_str()) {
        return Err(ValidationError::InvalidOptimizer(
            spec.optimizer.name.clone(),
        ));
    }

    let training = &spec.training;
    if training.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(training.epochs));
    }
    if training.patience == 0 {
        return Err(ValidationError::InvalidPatience(training.patience));
    }
    if training.batch_size == Some(0) {
        return Err(ValidationError::InvalidBatchSize(0));
    }
    if training.max_batch_size == 0 {
        return Err(ValidationError::InvalidMaxBatchSize(0));
    }
    if training.num_workers == 0 {
        return Err(ValidationError::InvalidWorkers(0));
    }
    if let Some(grad_clip) = training.grad_clip {
        if grad_clip <= 0.0 {
            return Err(ValidationError::InvalidGradClip(grad_clip));
        }
    }

    match &spec.features {
        FeatureSpec::Spectral(params) => {
            params
                .check()
                .map_err(|e| ValidationError::InvalidFeatures {
                    kind: spec.features.kind(),
                    reason: e.to_string(),
                })?;
        }
        FeatureSpec::Pretrained(params) => {
            if params.frame_size == 0 || params.sample_rate == 0 {
                return Err(ValidationError::InvalidFeatures {
                    kind: spec.features.kind(),
                    reason: "frame_size and sample_rate must be > 0".to_string(),
                });
            }
        }
    }

    Ok(())
}
