//! Mean-pooled MLP classifier with one ReLU hidden layer

use ndarray::Array2;
use rand_chacha::ChaCha8Rng;

use super::{
    affine, affine_backward, check_input, mean_pool, xavier, Classifier, ForwardPass, ModelKind,
};
use crate::data::Batch;
use crate::error::{Error, Result};
use crate::Tensor;

pub struct MlpClassifier {
    input_size: usize,
    hidden_size: usize,
    output_size: usize,
    /// `[w1 (H x F), b1 (H), w2 (C x H), b2 (C)]`
    params: Vec<Tensor>,
}

impl MlpClassifier {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        output_size: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        Self {
            input_size,
            hidden_size,
            output_size,
            params: vec![
                xavier(input_size, hidden_size, rng),
                Tensor::zeros(hidden_size, true),
                xavier(hidden_size, output_size, rng),
                Tensor::zeros(output_size, true),
            ],
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

impl Classifier for MlpClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Mlp
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
        let pre = affine(&pooled, &self.params[0], &self.params[1], self.hidden_size)?;
        let act = pre.mapv(|v| v.max(0.0));
        let logits = affine(&act, &self.params[2], &self.params[3], self.output_size)?;
        Ok(ForwardPass {
            logits,
            pooled,
            hidden: Some(pre),
        })
    }

    fn backward(&self, pass: &ForwardPass, grad_logits: &Array2<f32>) -> Result<()> {
        let pre = pass
            .hidden
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("forward pass has no hidden layer".into()))?;
        let act = pre.mapv(|v| v.max(0.0));

        affine_backward(grad_logits, &act, &self.params[2], &self.params[3]);

        let w2 = self.params[2].view2(self.output_size, self.hidden_size)?;
        let mut grad_hidden = grad_logits.dot(&w2);
        grad_hidden.zip_mut_with(pre, |g, &p| {
            if p <= 0.0 {
                *g = 0.0;
            }
        });

        affine_backward(&grad_hidden, &pass.pooled, &self.params[0], &self.params[1]);
        Ok(())
    }

    fn params(&self) -> &[Tensor] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn param_names(&self) -> Vec<String> {
        ["hidden.weight", "hidden.bias", "output.weight", "output.bias"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn step_memory(&self, batch: usize, frames: usize, training: bool) -> usize {
        let (f, h, c) = (self.input_size, self.hidden_size, self.output_size);
        let activations = batch * (frames * f + f + 2 * h + c);
        let weights = h * f + h + c * h + c;
        let floats = if training {
            2 * activations + 4 * weights
        } else {
            activations + weights
        };
        floats * std::mem::size_of::<f32>()
    }
}
