//! Mean-pooled linear classifier

use ndarray::Array2;
use rand_chacha::ChaCha8Rng;

use super::{
    affine, affine_backward, check_input, mean_pool, xavier, Classifier, ForwardPass, ModelKind,
};
use crate::data::Batch;
use crate::error::Result;
use crate::Tensor;

/// `logits = mean_pool(x) · Wᵀ + b`
pub struct LinearClassifier {
    input_size: usize,
    output_size: usize,
    /// `[weight (C x F), bias (C)]`
    params: Vec<Tensor>,
}

impl LinearClassifier {
    pub fn new(input_size: usize, output_size: usize, rng: &mut ChaCha8Rng) -> Self {
        Self {
            input_size,
            output_size,
            params: vec![
                xavier(input_size, output_size, rng),
                Tensor::zeros(output_size, true),
            ],
        }
    }
}

impl Classifier for LinearClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn forward(&self, batch: &Batch) -> Result<ForwardPass> {
        check_input(batch, self.input_size)?;
        let pooled = mean_pool(batch);
        let logits = affine(&pooled, &self.params[0], &self.params[1], self.output_size)?;
        Ok(ForwardPass {
            logits,
            pooled,
            hidden: None,
        })
    }

    fn backward(&self, pass: &ForwardPass, grad_logits: &Array2<f32>) -> Result<()> {
        affine_backward(grad_logits, &pass.pooled, &self.params[0], &self.params[1]);
        Ok(())
    }

    fn params(&self) -> &[Tensor] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn param_names(&self) -> Vec<String> {
        vec!["linear.weight".to_string(), "linear.bias".to_string()]
    }

    fn step_memory(&self, batch: usize, frames: usize, training: bool) -> usize {
        let f = self.input_size;
        let c = self.output_size;
        let activations = batch * (frames * f + f + c);
        let weights = f * c + c;
        // Training keeps gradients plus two optimizer moments
        let floats = if training {
            2 * activations + 4 * weights
        } else {
            activations + weights
        };
        floats * std::mem::size_of::<f32>()
    }
}
