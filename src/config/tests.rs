//! Integration tests for config module

use super::*;
use crate::features::FeatureSpec;
use crate::io::ModelFormat;
use crate::model::ModelKind;
use std::io::Write;
use tempfile::NamedTempFile;

fn load(yaml: &str) -> crate::Result<RunSpec> {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(yaml.as_bytes()).unwrap();
    train::load_config(temp_file.path())
}

#[test]
fn test_end_to_end_config_loading() {
    let spec = load(
        r#"
data:
  train: train.csv
  test: test.csv
  submission: sample_submission.csv
  num_classes: 6

features:
  kind: spectral
  n_fft: 512
  hop_length: 160
  n_mels: 40
  n_mfcc: 20

model:
  kind: mlp
  hidden_size: 128

optimizer:
  name: adam
  lr: 0.0001
  beta1: 0.9
  beta2: 0.999

training:
  epochs: 50
  patience: 5
  grad_clip: 1.0

cv:
  k: 5
  seed: 42

output:
  result_path: ./result
  model_format: yaml
"#,
    )
    .unwrap();

    assert_eq!(spec.model.kind, ModelKind::Mlp);
    assert_eq!(spec.features.kind(), "spectral");
    assert_eq!(spec.training.grad_clip, Some(1.0));
    assert_eq!(spec.output.model_format, ModelFormat::Yaml);

    let optimizer = build_optimizer(&spec.optimizer).unwrap();
    assert!((optimizer.lr() - 0.0001).abs() < 1e-9);

    let settings = build_fold_settings(&spec);
    assert_eq!(settings.epochs, 50);
    assert_eq!(settings.patience, 5);
    assert_eq!(settings.model_format, ModelFormat::Yaml);
}

#[test]
fn test_minimal_config() {
    let spec = load(
        r#"
data:
  train: train.csv
  test: test.csv
  submission: sample_submission.csv

model:
  kind: linear

optimizer:
  name: sgd
  lr: 0.01
"#,
    )
    .unwrap();

    // Defaults are applied
    assert_eq!(spec.training.epochs, 100);
    assert_eq!(spec.cv, CvParams { k: 5, seed: 42 });
    assert!(matches!(spec.features, FeatureSpec::Spectral(_)));
    assert!(build_device(&spec).memory_budget.is_none());
}

#[test]
fn test_inconsistent_features_rejected() {
    let err = load(
        r#"
data:
  train: train.csv
  test: test.csv
  submission: sample_submission.csv

features:
  kind: spectral
  n_mels: 10
  n_mfcc: 20

model:
  kind: mlp

optimizer:
  name: adam
  lr: 0.001
"#,
    )
    .unwrap_err();

    assert!(err.to_string().contains("spectral"));
}
