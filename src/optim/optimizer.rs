//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}

/// Rescale all gradients so their joint L2 norm is at most `max_norm`
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(params: &mut [Tensor], max_norm: f32) -> f32 {
    let total: f32 = params
        .iter()
        .filter_map(|p| p.grad())
        .map(|g| g.iter().map(|v| v * v).sum::<f32>())
        .sum::<f32>()
        .sqrt();

    if total > max_norm && total > 0.0 {
        let scale = max_norm / total;
        for param in params.iter() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * scale);
            }
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_clip_grad_norm_scales_down() {
        let mut params = vec![Tensor::zeros(2, true)];
        params[0].set_grad(array![3.0, 4.0]);

        let norm = clip_grad_norm(&mut params, 1.0);

        assert_relative_eq!(norm, 5.0, epsilon = 1e-6);
        let clipped = params[0].grad().unwrap();
        assert_relative_eq!(clipped[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(clipped[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_clip_grad_norm_leaves_small_gradients() {
        let mut params = vec![Tensor::zeros(2, true)];
        params[0].set_grad(array![0.3, 0.4]);

        clip_grad_norm(&mut params, 1.0);

        assert_eq!(params[0].grad().unwrap(), array![0.3, 0.4]);
    }
}
