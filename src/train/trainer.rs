//! Trainer abstraction for training loops

use ndarray::{Array1, Array2};
use std::time::Instant;

use super::callback::{CallbackAction, CallbackContext, CallbackManager, TrainerCallback};
use super::loss::softmax;
use super::{LossFn, MetricsTracker, TrainConfig};
use crate::data::{Batch, DataLoader};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::model::Classifier;
use crate::optim::{clip_grad_norm, Optimizer};

/// Result of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainResult {
    /// Epochs completed
    pub final_epoch: usize,
    /// Training loss of the last completed epoch
    pub final_loss: f32,
    /// Best validation loss, if validation data was given
    pub best_val_loss: Option<f32>,
    /// Epoch (0-indexed) whose weights were kept
    pub best_epoch: Option<usize>,
    /// Whether training was stopped early
    pub stopped_early: bool,
    /// Total training time in seconds
    pub elapsed_secs: f64,
}

/// High-level trainer that drives a classifier over data loaders
///
/// ```no_run
/// use foldwise::model::{build_model, ModelSpec};
/// use foldwise::optim::Adam;
/// use foldwise::train::{CrossEntropyLoss, EarlyStopping, TrainConfig, Trainer};
///
/// let model = build_model(&ModelSpec::default(), Some(40), 6, 0).unwrap();
/// let mut trainer = Trainer::new(
///     model,
///     Box::new(Adam::default_params(1e-3)),
///     Box::new(CrossEntropyLoss),
///     TrainConfig::default(),
/// );
/// trainer.add_callback(EarlyStopping::new(5, 0.0).monitor_validation());
/// // let result = trainer.train(100, &train_loader, Some(&valid_loader), &device)?;
/// ```
pub struct Trainer {
    model: Box<dyn Classifier>,

    optimizer: Box<dyn Optimizer>,

    loss_fn: Box<dyn LossFn>,

    config: TrainConfig,

    /// Metrics tracker
    pub metrics: MetricsTracker,

    callbacks: CallbackManager,

    /// Parameter values at the best validation loss
    best_values: Option<Vec<Array1<f32>>>,

    start_time: Option<Instant>,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(
        model: Box<dyn Classifier>,
        optimizer: Box<dyn Optimizer>,
        loss_fn: Box<dyn LossFn>,
        config: TrainConfig,
    ) -> Self {
        Self {
            model,
            optimizer,
            loss_fn,
            config,
            metrics: MetricsTracker::new(),
            callbacks: CallbackManager::new(),
            best_values: None,
            start_time: None,
        }
    }

    /// Add a callback to the trainer
    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    /// Get current learning rate
    pub fn lr(&self) -> f32 {
        self.optimizer.lr()
    }

    pub fn model(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    /// Consume the trainer, returning the model
    pub fn into_model(self) -> Box<dyn Classifier> {
        self.model
    }

    /// Build callback context from current state
    fn build_context(
        &self,
        epoch: usize,
        max_epochs: usize,
        step: usize,
        steps_per_epoch: usize,
        loss: f32,
        val_loss: Option<f32>,
    ) -> CallbackContext {
        CallbackContext {
            epoch,
            max_epochs,
            step,
            steps_per_epoch,
            loss,
            lr: self.lr(),
            best_val_loss: self.metrics.best_val_loss(),
            val_loss,
            elapsed_secs: self
                .start_time
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    /// Perform a single training step (forward, backward, optimizer update)
    ///
    /// The step's working set is reserved on `device` first, so a batch that
    /// does not fit fails with `ResourceExhausted` before touching the model.
    pub fn train_step(&mut self, batch: &Batch, device: &Device) -> Result<f32> {
        let targets = batch
            .labels
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("training batch has no labels".into()))?;
        device.reserve(self.model.step_memory(batch.size(), batch.frames(), true))?;

        self.optimizer.zero_grad(self.model.params_mut());

        let pass = self.model.forward(batch)?;
        let out = self.loss_fn.forward(&pass.logits, targets)?;
        if !out.loss.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "non-finite training loss {}",
                out.loss
            )));
        }
        self.model.backward(&pass, &out.grad)?;

        if let Some(max_norm) = self.config.max_grad_norm {
            clip_grad_norm(self.model.params_mut(), max_norm);
        }
        self.optimizer.step(self.model.params_mut());
        self.metrics.steps += 1;

        Ok(out.loss)
    }

    /// Mean loss over a labelled loader
    pub fn evaluate(&self, loader: &DataLoader, device: &Device) -> Result<f32> {
        let mut total = 0.0f32;
        let mut count = 0usize;
        for batch in loader.epoch(0) {
            let batch = batch?;
            let targets = batch
                .labels
                .as_ref()
                .ok_or_else(|| Error::InvalidParameter("evaluation batch has no labels".into()))?;
            device.reserve(self.model.step_memory(batch.size(), batch.frames(), false))?;
            let pass = self.model.forward(&batch)?;
            let out = self.loss_fn.forward(&pass.logits, targets)?;
            total += out.loss * batch.size() as f32;
            count += batch.size();
        }
        Ok(if count > 0 { total / count as f32 } else { 0.0 })
    }

    /// Softmax probabilities, one row per dataset item
    pub fn predict(&self, loader: &DataLoader, device: &Device) -> Result<Array2<f32>> {
        let mut probs = Array2::<f32>::zeros((loader.len(), self.model.output_size()));
        for batch in loader.epoch(0) {
            let batch = batch?;
            device.reserve(self.model.step_memory(batch.size(), batch.frames(), false))?;
            let pass = self.model.forward(&batch)?;
            let p = softmax(&pass.logits);
            for (row, &index) in batch.indices.iter().enumerate() {
                probs.row_mut(index).assign(&p.row(row));
            }
        }
        Ok(probs)
    }

    /// Train for up to `max_epochs` with full callback support
    ///
    /// With validation data the weights of the best validation epoch are
    /// restored before returning.
    pub fn train(
        &mut self,
        max_epochs: usize,
        train_loader: &DataLoader,
        valid_loader: Option<&DataLoader>,
        device: &Device,
    ) -> Result<TrainResult> {
        let start = Instant::now();
        self.start_time = Some(start);
        self.best_values = None;
        let mut stopped_early = false;
        let mut final_loss = 0.0;
        let steps_per_epoch = train_loader.num_batches();

        let ctx = self.build_context(0, max_epochs, 0, steps_per_epoch, 0.0, None);
        self.callbacks.on_train_begin(&ctx);

        for epoch in 0..max_epochs {
            let mut total_loss = 0.0;
            let mut num_batches = 0;

            for (step, batch) in train_loader.epoch(epoch).enumerate() {
                let loss = self.train_step(&batch?, device)?;
                total_loss += loss;
                num_batches += 1;

                let ctx = self.build_context(epoch, max_epochs, step, steps_per_epoch, loss, None);
                if self.callbacks.on_step_end(&ctx) == CallbackAction::Stop {
                    stopped_early = true;
                    break;
                }
            }

            if stopped_early {
                break;
            }

            let avg_loss = if num_batches > 0 {
                total_loss / num_batches as f32
            } else {
                0.0
            };
            final_loss = avg_loss;
            self.metrics.record_epoch(avg_loss);

            let val_loss = match valid_loader {
                Some(loader) => {
                    let previous_best = self.metrics.best_val_loss();
                    let val = self.evaluate(loader, device)?;
                    self.metrics.record_val_loss(val);
                    if previous_best.is_none_or(|best| val < best) {
                        self.best_values = Some(self.model.values());
                    }
                    Some(val)
                }
                None => None,
            };

            let ctx = self.build_context(
                epoch,
                max_epochs,
                steps_per_epoch,
                steps_per_epoch,
                avg_loss,
                val_loss,
            );
            if self.callbacks.on_epoch_end(&ctx) == CallbackAction::Stop {
                stopped_early = true;
                break;
            }
        }

        if let Some(values) = self.best_values.take() {
            self.model.load_values(&values)?;
        }

        let ctx = self.build_context(self.metrics.epoch, max_epochs, 0, 0, final_loss, None);
        self.callbacks.on_train_end(&ctx);

        Ok(self.result(final_loss, stopped_early, start))
    }

    fn result(&self, final_loss: f32, stopped_early: bool, start: Instant) -> TrainResult {
        TrainResult {
            final_epoch: self.metrics.epoch,
            final_loss,
            best_val_loss: self.metrics.best_val_loss(),
            best_epoch: self.metrics.best_val_epoch(),
            stopped_early,
            elapsed_secs: start.elapsed().as_secs_f64(),
        }
    }

    /// Get reference to callback manager
    pub fn callbacks(&self) -> &CallbackManager {
        &self.callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{fixtures, DataLoader, Order, Scaler};
    use crate::model::{build_model, ModelKind, ModelSpec};
    use crate::optim::Adam;
    use crate::train::{CrossEntropyLoss, EarlyStopping};
    use std::sync::Arc;

    fn trainer(kind: ModelKind) -> Trainer {
        let spec = ModelSpec {
            kind,
            hidden_size: 8,
            input_size: None,
        };
        Trainer::new(
            build_model(&spec, Some(2), 2, 0).unwrap(),
            Box::new(Adam::default_params(0.05)),
            Box::new(CrossEntropyLoss),
            TrainConfig::new().with_log_interval(100),
        )
    }

    /// Stems 1..=8 with labels `stem % 2`, min-max scaled
    fn loader(order: Order) -> DataLoader {
        let pool = fixtures::pool();
        let mut ds = fixtures::stem_dataset(&[1, 2, 3, 4, 5, 6, 7, 8], &pool);
        let scaler = Scaler::fit_min_max(ds.stats()).unwrap();
        ds.bind_scaler(Arc::new(scaler));
        DataLoader::new(Arc::new(ds), 3, order, Arc::new(pool)).unwrap()
    }

    #[test]
    fn test_train_step() {
        let mut trainer = trainer(ModelKind::Linear);
        let batch = loader(Order::Sequential).batch(&[0, 1, 2]).unwrap();

        let loss = trainer.train_step(&batch, &Device::cpu()).unwrap();

        assert!(loss > 0.0 && loss.is_finite());
        assert_eq!(trainer.metrics.steps, 1);
    }

    #[test]
    fn test_train_step_respects_device_budget() {
        let mut trainer = trainer(ModelKind::Mlp);
        let batch = loader(Order::Sequential).batch(&[0, 1, 2]).unwrap();
        let before = trainer.model().values();

        let err = trainer
            .train_step(&batch, &Device::with_budget("tiny", 16))
            .unwrap_err();

        assert!(err.is_resource_exhausted());
        assert_eq!(trainer.model().values(), before);
    }

    #[test]
    fn test_train_runs_all_epochs() {
        let mut trainer = trainer(ModelKind::Mlp);
        let train = loader(Order::Shuffled { seed: 1 });
        let valid = loader(Order::Sequential);

        let result = trainer.train(3, &train, Some(&valid), &Device::cpu()).unwrap();

        assert!(!result.stopped_early);
        assert_eq!(result.final_epoch, 3);
        assert_eq!(trainer.metrics.steps, 9);
        assert_eq!(trainer.metrics.val_losses.len(), 3);
        assert!(result.best_val_loss.is_some());
    }

    #[test]
    fn test_best_weights_restored() {
        let mut trainer = trainer(ModelKind::Linear);
        let train = loader(Order::Shuffled { seed: 3 });
        let valid = loader(Order::Sequential);

        let result = trainer.train(5, &train, Some(&valid), &Device::cpu()).unwrap();
        let restored = trainer.evaluate(&valid, &Device::cpu()).unwrap();

        approx::assert_relative_eq!(restored, result.best_val_loss.unwrap(), epsilon = 1e-5);
    }

    #[test]
    fn test_early_stopping_halts() {
        let mut trainer = trainer(ModelKind::Linear);
        // Zero patience stops after the first epoch
        trainer.add_callback(EarlyStopping::new(0, 0.0).monitor_validation());
        let train = loader(Order::Sequential);
        let valid = loader(Order::Sequential);

        let result = trainer.train(10, &train, Some(&valid), &Device::cpu()).unwrap();

        assert!(result.stopped_early);
        assert_eq!(result.final_epoch, 1);
        assert_eq!(result.best_epoch, Some(0));
    }

    #[test]
    fn test_predict_rows_are_distributions() {
        let trainer = trainer(ModelKind::Mlp);
        let loader = loader(Order::Sequential);

        let probs = trainer.predict(&loader, &Device::cpu()).unwrap();

        assert_eq!(probs.dim(), (8, 2));
        for row in probs.rows() {
            approx::assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_unlabelled_batch_rejected() {
        let mut trainer = trainer(ModelKind::Linear);
        let mut batch = loader(Order::Sequential).batch(&[0]).unwrap();
        batch.labels = None;
        assert!(trainer.train_step(&batch, &Device::cpu()).is_err());
    }
}
