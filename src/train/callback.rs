//! Training hooks
//!
//! The trainer reports to its callbacks when training starts, after every
//! step, after every epoch (validation loss already known) and when training
//! ends. Any callback may stop training from `on_epoch_end` or `on_step_end`.
//!
//! ```rust
//! use foldwise::train::callback::{CallbackAction, CallbackContext, TrainerCallback};
//!
//! struct StopAfter(usize);
//!
//! impl TrainerCallback for StopAfter {
//!     fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
//!         if ctx.epoch + 1 >= self.0 {
//!             CallbackAction::Stop
//!         } else {
//!             CallbackAction::Continue
//!         }
//!     }
//! }
//! ```

use crate::logging::RunLog;

/// Training state handed to callbacks
#[derive(Clone, Debug, Default)]
pub struct CallbackContext {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    pub max_epochs: usize,
    /// Step within the epoch
    pub step: usize,
    pub steps_per_epoch: usize,
    /// Loss of the last step, or the epoch mean in `on_epoch_end`
    pub loss: f32,
    pub lr: f32,
    pub best_val_loss: Option<f32>,
    pub val_loss: Option<f32>,
    pub elapsed_secs: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Observer of a training run; every hook defaults to a no-op
pub trait TrainerCallback: Send {
    fn on_train_begin(&mut self, _ctx: &CallbackContext) {}

    fn on_train_end(&mut self, _ctx: &CallbackContext) {}

    fn on_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    fn name(&self) -> &str {
        "TrainerCallback"
    }
}

// =============================================================================
// Early Stopping
// =============================================================================

/// Stops training once the monitored loss has not improved by more than
/// `min_delta` for `patience` consecutive epochs.
///
/// ```rust
/// use foldwise::train::callback::EarlyStopping;
///
/// let early_stop = EarlyStopping::new(5, 0.0).monitor_validation();
/// ```
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f32,
    best: f32,
    stale_epochs: usize,
    /// Watch validation loss, falling back to training loss when absent
    monitor_val: bool,
    log: Option<RunLog>,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f32) -> Self {
        Self {
            patience,
            min_delta,
            best: f32::INFINITY,
            stale_epochs: 0,
            monitor_val: false,
            log: None,
        }
    }

    pub fn monitor_validation(mut self) -> Self {
        self.monitor_val = true;
        self
    }

    /// Report the stop decision to a run log
    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = Some(log);
        self
    }

    fn observe(&mut self, loss: f32) {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.stale_epochs = 0;
        } else {
            self.stale_epochs += 1;
        }
    }
}

impl TrainerCallback for EarlyStopping {
    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let loss = match (self.monitor_val, ctx.val_loss) {
            (true, Some(val)) => val,
            _ => ctx.loss,
        };
        self.observe(loss);

        if self.stale_epochs < self.patience {
            return CallbackAction::Continue;
        }
        if let Some(log) = &self.log {
            log.info(format!(
                "early stopping after epoch {}: no improvement for {} epochs (best {:.4})",
                ctx.epoch + 1,
                self.stale_epochs,
                self.best
            ));
        }
        CallbackAction::Stop
    }

    fn name(&self) -> &str {
        "EarlyStopping"
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Writes per-epoch progress (and every `log_interval` steps at debug level)
/// to a run log
#[derive(Clone, Debug)]
pub struct ProgressCallback {
    log: RunLog,
    log_interval: usize,
}

impl ProgressCallback {
    pub fn new(log: RunLog, log_interval: usize) -> Self {
        Self { log, log_interval }
    }
}

impl TrainerCallback for ProgressCallback {
    fn on_train_begin(&mut self, ctx: &CallbackContext) {
        self.log.info(format!(
            "training for up to {} epochs of {} steps (lr {:.2e})",
            ctx.max_epochs, ctx.steps_per_epoch, ctx.lr
        ));
    }

    fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let val = ctx
            .val_loss
            .map(|v| format!(", val_loss: {v:.4}"))
            .unwrap_or_default();
        self.log.info(format!(
            "epoch {}/{}: loss: {:.4}{} ({:.1}s)",
            ctx.epoch + 1,
            ctx.max_epochs,
            ctx.loss,
            val,
            ctx.elapsed_secs
        ));
        CallbackAction::Continue
    }

    fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        if self.log_interval > 0 && (ctx.step + 1) % self.log_interval == 0 {
            self.log.debug(format!(
                "step {}/{}: loss: {:.4}",
                ctx.step + 1,
                ctx.steps_per_epoch,
                ctx.loss
            ));
        }
        CallbackAction::Continue
    }

    fn on_train_end(&mut self, ctx: &CallbackContext) {
        if let Some(best) = ctx.best_val_loss {
            self.log.info(format!(
                "training finished after {} epochs, best val_loss: {best:.4}",
                ctx.epoch
            ));
        }
    }

    fn name(&self) -> &str {
        "ProgressCallback"
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Ordered set of callbacks receiving every event
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainerCallback>>,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    pub fn on_train_begin(&mut self, ctx: &CallbackContext) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_train_begin(ctx));
    }

    pub fn on_train_end(&mut self, ctx: &CallbackContext) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_train_end(ctx));
    }

    /// Every callback sees the event even after one asked to stop
    pub fn on_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        Self::merge(self.callbacks.iter_mut().map(|cb| cb.on_epoch_end(ctx)))
    }

    pub fn on_step_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        Self::merge(self.callbacks.iter_mut().map(|cb| cb.on_step_end(ctx)))
    }

    fn merge(actions: impl Iterator<Item = CallbackAction>) -> CallbackAction {
        actions.fold(CallbackAction::Continue, |acc, action| {
            if action == CallbackAction::Stop {
                CallbackAction::Stop
            } else {
                acc
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn epoch(epoch: usize, loss: f32, val_loss: Option<f32>) -> CallbackContext {
        CallbackContext {
            epoch,
            loss,
            val_loss,
            ..Default::default()
        }
    }

    #[test]
    fn test_early_stopping_waits_for_patience() {
        let mut es = EarlyStopping::new(2, 0.01);

        assert_eq!(es.on_epoch_end(&epoch(0, 1.0, None)), CallbackAction::Continue);
        // Within min_delta counts as stale
        assert_eq!(es.on_epoch_end(&epoch(1, 0.995, None)), CallbackAction::Continue);
        assert_eq!(es.on_epoch_end(&epoch(2, 0.999, None)), CallbackAction::Stop);
    }

    #[test]
    fn test_early_stopping_improvement_resets_count() {
        let mut es = EarlyStopping::new(2, 0.0);

        es.on_epoch_end(&epoch(0, 1.0, None));
        es.on_epoch_end(&epoch(1, 1.0, None));
        assert_eq!(es.on_epoch_end(&epoch(2, 0.5, None)), CallbackAction::Continue);
        assert_eq!(es.stale_epochs, 0);
        assert_eq!(es.best, 0.5);
    }

    #[test]
    fn test_early_stopping_monitors_validation() {
        let mut es = EarlyStopping::new(1, 0.0).monitor_validation();
        assert_eq!(es.on_epoch_end(&epoch(0, 1.0, Some(0.5))), CallbackAction::Continue);

        // Training loss improves, validation does not
        assert_eq!(es.on_epoch_end(&epoch(1, 0.1, Some(0.6))), CallbackAction::Stop);
    }

    #[test]
    fn test_early_stopping_falls_back_to_training_loss() {
        let mut es = EarlyStopping::new(1, 0.0).monitor_validation();
        es.on_epoch_end(&epoch(0, 1.0, None));
        assert_eq!(es.on_epoch_end(&epoch(1, 0.5, None)), CallbackAction::Continue);
        assert_eq!(es.on_epoch_end(&epoch(2, 0.7, None)), CallbackAction::Stop);
    }

    #[test]
    fn test_manager_delivers_to_all_callbacks() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::create(dir.path().join("log.log"), "1-fold").unwrap();

        let mut manager = CallbackManager::new();
        manager.add(EarlyStopping::new(1, 0.0));
        manager.add(ProgressCallback::new(log, 0));
        assert_eq!(manager.names(), vec!["EarlyStopping", "ProgressCallback"]);

        let ctx = CallbackContext {
            max_epochs: 5,
            loss: 1.0,
            ..Default::default()
        };
        assert_eq!(manager.on_epoch_end(&ctx), CallbackAction::Continue);
        assert_eq!(manager.on_epoch_end(&ctx), CallbackAction::Stop);

        // The progress callback still logged the stopping epoch
        let text = std::fs::read_to_string(dir.path().join("log.log")).unwrap();
        assert_eq!(text.matches("epoch 1/5").count(), 2);
    }

    #[test]
    fn test_progress_callback_writes_log() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::create(dir.path().join("log.log"), "1-fold").unwrap();
        let mut progress = ProgressCallback::new(log, 5);
        let ctx = CallbackContext {
            epoch: 0,
            max_epochs: 10,
            step: 4,
            steps_per_epoch: 100,
            loss: 0.5,
            val_loss: Some(0.7),
            lr: 0.001,
            ..Default::default()
        };

        progress.on_train_begin(&ctx);
        assert_eq!(progress.on_step_end(&ctx), CallbackAction::Continue);
        assert_eq!(progress.on_epoch_end(&ctx), CallbackAction::Continue);

        let text = std::fs::read_to_string(dir.path().join("log.log")).unwrap();
        assert!(text.contains("training for up to 10 epochs of 100 steps"));
        assert!(text.contains("epoch 1/10: loss: 0.5000, val_loss: 0.7000"));
    }
}
