//! Build run components from configuration

use super::schema::{OptimSpec, RunSpec};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::optim::{Adam, Optimizer, SGD};
use crate::train::{FoldSettings, TrainConfig};

fn param(spec: &OptimSpec, key: &str, default: f64) -> f32 {
    spec.params
        .get(key)
        .and_then(|v| v.as_f64())
        .unwrap_or(default) as f32
}

/// Build optimizer from configuration
pub fn build_optimizer(spec: &OptimSpec) -> Result<Box<dyn Optimizer>> {
    match spec.name.to_lowercase().as_str() {
        "sgd" => Ok(Box::new(SGD::new(spec.lr, param(spec, "momentum", 0.0)))),
        "adam" => Ok(Box::new(Adam::new(
            spec.lr,
            param(spec, "beta1", 0.9),
            param(spec, "beta2", 0.999),
            param(spec, "eps", 1e-8),
        ))),
        name => Err(Error::ConfigError(format!(
            "Unknown optimizer: {}. Supported: sgd, adam",
            name
        ))),
    }
}

/// Device described by the `device` section
pub fn build_device(spec: &RunSpec) -> Device {
    Device::from_megabytes(spec.device.memory_mb)
}

/// Training loop settings shared by every fold of a run
pub fn build_fold_settings(spec: &RunSpec) -> FoldSettings {
    let train = TrainConfig::new()
        .with_log_interval(spec.training.log_interval)
        .with_grad_clip(spec.training.grad_clip);

    FoldSettings {
        model: spec.model.clone(),
        optimizer: spec.optimizer.clone(),
        num_classes: spec.data.num_classes,
        epochs: spec.training.epochs,
        patience: spec.training.patience,
        seed: spec.cv.seed,
        max_batch_size: spec.training.max_batch_size,
        model_format: spec.output.model_format,
        train,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn optim(name: &str) -> OptimSpec {
        OptimSpec {
            name: name.to_string(),
            lr: 0.01,
            params: HashMap::new(),
        }
    }

    #[test]
    fn test_build_sgd() {
        let mut spec = optim("sgd");
        spec.params
            .insert("momentum".to_string(), serde_json::json!(0.9));
        let opt = build_optimizer(&spec).unwrap();
        assert_eq!(opt.lr(), 0.01);
    }

    #[test]
    fn test_build_adam_case_insensitive() {
        let opt = build_optimizer(&optim("Adam")).unwrap();
        assert_eq!(opt.lr(), 0.01);
    }

    #[test]
    fn test_unknown_optimizer() {
        let err = build_optimizer(&optim("adamw")).err().unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_fold_settings_from_spec() {
        let yaml = r#"
data: {train: a.csv, test: b.csv, submission: c.csv, num_classes: 3}
model: {kind: linear}
optimizer: {name: sgd, lr: 0.1}
training: {epochs: 7, patience: 2, grad_clip: 0.5}
cv: {k: 4, seed: 9}
device: {memory_mb: 1}
"#;
        let spec: RunSpec = serde_yaml::from_str(yaml).unwrap();
        let settings = build_fold_settings(&spec);

        assert_eq!(settings.num_classes, 3);
        assert_eq!(settings.epochs, 7);
        assert_eq!(settings.patience, 2);
        assert_eq!(settings.seed, 9);
        assert_eq!(settings.train.max_grad_norm, Some(0.5));
        assert_eq!(build_device(&spec).memory_budget, Some(1024 * 1024));
    }
}
