//! Trainer settings and per-run loss history

/// Settings of the inner training loop
#[derive(Clone, Debug)]
pub struct TrainConfig {
    /// Global gradient norm ceiling; `None` leaves gradients untouched
    pub max_grad_norm: Option<f32>,
    /// Debug-log the step loss every N steps (0 disables)
    pub log_interval: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_grad_norm: None,
            log_interval: 10,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grad_clip(mut self, max_norm: Option<f32>) -> Self {
        self.max_grad_norm = max_norm;
        self
    }

    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval;
        self
    }
}

/// Losses seen by one trainer, one entry per completed epoch
#[derive(Clone, Debug, Default)]
pub struct MetricsTracker {
    pub losses: Vec<f32>,
    pub val_losses: Vec<f32>,
    /// Optimizer steps taken
    pub steps: usize,
    /// Completed epochs
    pub epoch: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_epoch(&mut self, loss: f32) {
        self.losses.push(loss);
        self.epoch += 1;
    }

    pub fn record_val_loss(&mut self, val_loss: f32) {
        self.val_losses.push(val_loss);
    }

    pub fn best_val_loss(&self) -> Option<f32> {
        self.val_losses.iter().copied().min_by(f32::total_cmp)
    }

    /// Epoch (0-indexed) of the best validation loss, earliest on ties
    pub fn best_val_epoch(&self) -> Option<usize> {
        let best = self.best_val_loss()?;
        self.val_losses.iter().position(|&v| v == best)
    }
}
