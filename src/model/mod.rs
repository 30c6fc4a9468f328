//! Classifier models
//!
//! A closed set of small sequence classifiers. Both mean-pool the valid
//! frames of each item and project the pooled vector to class logits; the
//! MLP adds one ReLU hidden layer. Gradients are analytic and written into
//! the parameter tensors' gradient slots.

mod linear;
mod mlp;

pub use linear::LinearClassifier;
pub use mlp::MlpClassifier;

use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::Batch;
use crate::error::{Error, Result};
use crate::Tensor;

/// Model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Linear,
    Mlp,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Mlp => "mlp",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model section of the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: ModelKind,

    /// Hidden width (MLP only)
    #[serde(default = "default_hidden")]
    pub hidden_size: usize,

    /// Explicit input size; inferred from the data when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<usize>,
}

fn default_hidden() -> usize {
    64
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            kind: ModelKind::Mlp,
            hidden_size: default_hidden(),
            input_size: None,
        }
    }
}

/// Output of a forward pass, kept for the backward pass
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Class scores, shape `(batch, classes)`
    pub logits: Array2<f32>,
    /// Mean-pooled inputs, shape `(batch, features)`
    pub pooled: Array2<f32>,
    /// Hidden pre-activations (MLP only)
    pub hidden: Option<Array2<f32>>,
}

/// A trainable sequence classifier
pub trait Classifier {
    fn kind(&self) -> ModelKind;

    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    fn forward(&self, batch: &Batch) -> Result<ForwardPass>;

    /// Accumulate parameter gradients for `d loss / d logits`
    fn backward(&self, pass: &ForwardPass, grad_logits: &Array2<f32>) -> Result<()>;

    fn params(&self) -> &[Tensor];

    fn params_mut(&mut self) -> &mut [Tensor];

    /// Parameter names, aligned with `params`
    fn param_names(&self) -> Vec<String>;

    /// Peak working-set bytes of one step
    fn step_memory(&self, batch: usize, frames: usize, training: bool) -> usize;

    /// Copy parameter values from `values` (same order and sizes as `params`)
    fn load_values(&mut self, values: &[Array1<f32>]) -> Result<()> {
        let params = self.params_mut();
        if values.len() != params.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![params.len()],
                got: vec![values.len()],
            });
        }
        for (param, value) in params.iter_mut().zip(values) {
            if param.len() != value.len() {
                return Err(Error::ShapeMismatch {
                    expected: vec![param.len()],
                    got: vec![value.len()],
                });
            }
            param.data_mut().assign(value);
        }
        Ok(())
    }

    /// Snapshot of the current parameter values
    fn values(&self) -> Vec<Array1<f32>> {
        self.params().iter().map(|p| p.data().clone()).collect()
    }
}

/// Build a freshly initialised model
///
/// `input_size` falls back to `spec.input_size`; a model cannot be built
/// without knowing it.
pub fn build_model(
    spec: &ModelSpec,
    input_size: Option<usize>,
    output_size: usize,
    seed: u64,
) -> Result<Box<dyn Classifier>> {
    let input_size = spec.input_size.or(input_size).ok_or_else(|| {
        Error::ConfigError("model input size is unknown; set model.input_size".to_string())
    })?;
    if input_size == 0 || output_size == 0 {
        return Err(Error::ConfigError(format!(
            "model sizes must be positive (input {input_size}, output {output_size})"
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Ok(match spec.kind {
        ModelKind::Linear => Box::new(LinearClassifier::new(input_size, output_size, &mut rng)),
        ModelKind::Mlp => {
            if spec.hidden_size == 0 {
                return Err(Error::ConfigError("hidden_size must be > 0".to_string()));
            }
            Box::new(MlpClassifier::new(
                input_size,
                spec.hidden_size,
                output_size,
                &mut rng,
            ))
        }
    })
}

/// Xavier-uniform weights for an `(out, in)` matrix, flattened row-major
pub(crate) fn xavier(fan_in: usize, fan_out: usize, rng: &mut ChaCha8Rng) -> Tensor {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let data: Vec<f32> = (0..fan_in * fan_out)
        .map(|_| rng.random_range(-bound..bound))
        .collect();
    Tensor::from_vec(data, true)
}

/// Mean over the valid frames of each item
pub(crate) fn mean_pool(batch: &Batch) -> Array2<f32> {
    let (rows, _, dim) = batch.inputs.dim();
    let mut pooled = Array2::<f32>::zeros((rows, dim));
    for (b, &len) in batch.lengths.iter().enumerate() {
        if len == 0 {
            continue;
        }
        let mean = batch
            .inputs
            .slice(s![b, ..len, ..])
            .sum_axis(Axis(0))
            / len as f32;
        pooled.row_mut(b).assign(&mean);
    }
    pooled
}

/// `x · Wᵀ + b` for `W` of shape `(out, in)`
pub(crate) fn affine(x: &Array2<f32>, w: &Tensor, b: &Tensor, out: usize) -> Result<Array2<f32>> {
    let w = w.view2(out, x.ncols())?;
    Ok(x.dot(&w.t()) + b.data())
}

/// Accumulate `gᵀ · x` and `Σ g` into an affine layer's gradients
pub(crate) fn affine_backward(g: &Array2<f32>, x: &Array2<f32>, w: &Tensor, b: &Tensor) {
    let dw = g.t().dot(x);
    w.accumulate_grad(dw.iter().copied().collect());
    b.accumulate_grad(g.sum_axis(Axis(0)));
}

pub(crate) fn check_input(batch: &Batch, input_size: usize) -> Result<()> {
    if batch.feature_dim() != input_size {
        return Err(Error::ShapeMismatch {
            expected: vec![batch.size(), batch.frames(), input_size],
            got: batch.inputs.shape().to_vec(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::collate;
    use ndarray::array;

    pub(crate) fn toy_batch() -> Batch {
        collate(vec![
            (0, array![[1.0, 0.0, 2.0], [3.0, 0.0, 2.0]], Some(0)),
            (1, array![[0.0, 1.0, -1.0]], Some(2)),
        ])
        .unwrap()
    }

    /// Finite-difference check of every parameter gradient
    pub(crate) fn check_gradients(model: &mut dyn Classifier, batch: &Batch) {
        // Loss = sum(logits * coef) with fixed coefficients
        let coef = |r: usize, c: usize| 0.3 + 0.1 * r as f32 - 0.2 * c as f32;
        let loss = |m: &dyn Classifier| {
            let logits = m.forward(batch).unwrap().logits;
            logits
                .indexed_iter()
                .map(|((r, c), v)| v * coef(r, c))
                .sum::<f32>()
        };

        for p in model.params() {
            p.zero_grad();
        }
        let pass = model.forward(batch).unwrap();
        let grad_logits = Array2::from_shape_fn(pass.logits.dim(), |(r, c)| coef(r, c));
        model.backward(&pass, &grad_logits).unwrap();
        let analytic: Vec<Array1<f32>> = model.params().iter().map(|p| p.grad().unwrap()).collect();

        let h = 1e-3;
        for (pi, grads) in analytic.iter().enumerate() {
            for j in 0..grads.len() {
                model.params_mut()[pi].data_mut()[j] += h;
                let up = loss(&*model);
                model.params_mut()[pi].data_mut()[j] -= 2.0 * h;
                let down = loss(&*model);
                model.params_mut()[pi].data_mut()[j] += h;
                let numeric = (up - down) / (2.0 * h);
                assert!(
                    (numeric - grads[j]).abs() < 1e-2,
                    "param {pi}[{j}]: numeric {numeric} vs analytic {}",
                    grads[j]
                );
            }
        }
    }

    #[test]
    fn test_mean_pool_ignores_padding() {
        let pooled = mean_pool(&toy_batch());
        assert_eq!(pooled, array![[2.0, 0.0, 2.0], [0.0, 1.0, -1.0]]);
    }

    #[test]
    fn test_build_model_needs_input_size() {
        let spec = ModelSpec::default();
        let err = build_model(&spec, None, 6, 0).err().unwrap();
        assert!(matches!(err, Error::ConfigError(_)));

        let model = build_model(&spec, Some(3), 6, 0).unwrap();
        assert_eq!(model.input_size(), 3);
        assert_eq!(model.output_size(), 6);
        assert_eq!(model.kind(), ModelKind::Mlp);
    }

    #[test]
    fn test_spec_input_size_wins() {
        let spec = ModelSpec {
            kind: ModelKind::Linear,
            input_size: Some(5),
            ..Default::default()
        };
        let model = build_model(&spec, Some(3), 2, 0).unwrap();
        assert_eq!(model.input_size(), 5);
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let spec = ModelSpec::default();
        let a = build_model(&spec, Some(4), 3, 11).unwrap();
        let b = build_model(&spec, Some(4), 3, 11).unwrap();
        let c = build_model(&spec, Some(4), 3, 12).unwrap();
        assert_eq!(a.values(), b.values());
        assert_ne!(a.values(), c.values());
    }

    #[test]
    fn test_load_values_checks_shapes() {
        let spec = ModelSpec {
            kind: ModelKind::Linear,
            ..Default::default()
        };
        let mut model = build_model(&spec, Some(2), 2, 0).unwrap();
        let mut values = model.values();
        values[1] = array![1.0, -1.0];
        model.load_values(&values).unwrap();
        assert_eq!(model.params()[1].data(), &array![1.0, -1.0]);

        assert!(model.load_values(&values[..1]).is_err());
        values[0] = array![1.0];
        assert!(model.load_values(&values).is_err());
    }

    #[test]
    fn test_model_kind_serde() {
        let kind: ModelKind = serde_yaml::from_str("mlp").unwrap();
        assert_eq!(kind, ModelKind::Mlp);
        assert_eq!(ModelKind::Linear.to_string(), "linear");
    }
}
