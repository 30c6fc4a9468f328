//! Loss functions for training

use ndarray::{Array2, Axis};

use crate::error::{Error, Result};

/// Loss value and its gradient with respect to the logits
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: f32,
    /// `d loss / d logits`, same shape as the logits
    pub grad: Array2<f32>,
}

/// Trait for loss functions over a batch of logits
pub trait LossFn {
    /// Compute the loss and its gradient for `(batch, classes)` logits
    fn forward(&self, logits: &Array2<f32>, targets: &[usize]) -> Result<LossOutput>;

    /// Name of the loss function
    fn name(&self) -> &str;
}

/// Row-wise softmax, numerically stabilised by the row maximum
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.to_owned();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    probs
}

/// Cross Entropy Loss over class indices, averaged over the batch
///
/// L = -mean(log(softmax(logits)[target]))
///
/// ```
/// use foldwise::train::{CrossEntropyLoss, LossFn};
/// use ndarray::array;
///
/// let out = CrossEntropyLoss.forward(&array![[2.0, 1.0, 0.5]], &[0]).unwrap();
/// assert!(out.loss > 0.0);
/// ```
pub struct CrossEntropyLoss;

impl LossFn for CrossEntropyLoss {
    fn forward(&self, logits: &Array2<f32>, targets: &[usize]) -> Result<LossOutput> {
        let (rows, classes) = logits.dim();
        if rows != targets.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![rows],
                got: vec![targets.len()],
            });
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= classes) {
            return Err(Error::InvalidParameter(format!(
                "target {bad} outside [0, {classes})"
            )));
        }

        let mut grad = softmax(logits);
        let mut total = 0.0f32;
        for (r, &t) in targets.iter().enumerate() {
            total -= (grad[[r, t]] + 1e-10).ln();
            grad[[r, t]] -= 1.0;
        }
        let scale = 1.0 / rows.max(1) as f32;
        grad *= scale;

        Ok(LossOutput {
            loss: total * scale,
            grad,
        })
    }

    fn name(&self) -> &str {
        "CrossEntropy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let out = CrossEntropyLoss.forward(&array![[0.0, 0.0, 0.0, 0.0]], &[2]).unwrap();
        assert_relative_eq!(out.loss, 4.0f32.ln(), epsilon = 1e-5);
        assert_relative_eq!(out.grad[[0, 2]], -0.75, epsilon = 1e-5);
        assert_relative_eq!(out.grad[[0, 0]], 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_cross_entropy_gradient_rows_sum_to_zero() {
        let logits = array![[2.0, 1.0, 0.5], [-1.0, 3.0, 0.0]];
        let out = CrossEntropyLoss.forward(&logits, &[0, 1]).unwrap();
        for row in out.grad.rows() {
            assert_relative_eq!(row.sum(), 0.0, epsilon = 1e-6);
        }
        assert!(out.loss > 0.0 && out.loss.is_finite());
    }

    #[test]
    fn test_cross_entropy_finite_difference() {
        let logits = array![[0.3, -0.2, 0.9]];
        let out = CrossEntropyLoss.forward(&logits, &[1]).unwrap();

        let h = 1e-3;
        for c in 0..3 {
            let mut up = logits.clone();
            up[[0, c]] += h;
            let mut down = logits.clone();
            down[[0, c]] -= h;
            let numeric = (CrossEntropyLoss.forward(&up, &[1]).unwrap().loss
                - CrossEntropyLoss.forward(&down, &[1]).unwrap().loss)
                / (2.0 * h);
            assert_relative_eq!(numeric, out.grad[[0, c]], epsilon = 1e-2);
        }
    }

    #[test]
    fn test_softmax() {
        let probs = softmax(&array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        for row in probs.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-5);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
        assert_relative_eq!(probs[[1, 0]], 1.0 / 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rejects_bad_targets() {
        let logits = array![[0.0, 1.0]];
        assert!(CrossEntropyLoss.forward(&logits, &[2]).is_err());
        assert!(CrossEntropyLoss.forward(&logits, &[0, 1]).is_err());
    }
}
