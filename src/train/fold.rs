//! Training and inference for a single fold
//!
//! A fold moves through `Created -> ScalerFit -> Training -> Converged ->
//! Predicting -> Done`; every transition is written to the fold log. Early
//! stopping ends `Training` normally. The batch size is probed at most once
//! per run: the first fold that finds it unresolved stores the result in the
//! [`RunContext`] and later folds reuse it. The probe runs on the longest item
//! of the fold's training, validation and test sets together, which covers
//! every training and test item of the run, so the size fits later folds too.

use ndarray::Array2;
use rayon::ThreadPool;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::callback::{EarlyStopping, ProgressCallback};
use super::probe::BatchSizeProber;
use super::{CrossEntropyLoss, TrainConfig, TrainResult, Trainer};
use crate::config::{build_optimizer, OptimSpec};
use crate::data::{AudioDataset, DataLoader, Example, Order, Scaler};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::io::{save_model, Model, ModelFormat, SaveConfig};
use crate::logging::RunLog;
use crate::model::{build_model, ModelSpec};

/// Settings shared by every fold of a run
#[derive(Debug, Clone)]
pub struct FoldSettings {
    pub model: ModelSpec,
    pub optimizer: OptimSpec,
    pub num_classes: usize,
    pub epochs: usize,
    pub patience: usize,
    /// Base seed; fold `i` initialises and shuffles with `seed + i`
    pub seed: u64,
    /// Upper bound for the batch size probe
    pub max_batch_size: usize,
    pub model_format: ModelFormat,
    pub train: TrainConfig,
}

/// Run-wide state handed from fold to fold
pub struct RunContext {
    pub device: Device,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub pool: Arc<ThreadPool>,
    /// Fixed by configuration, or resolved by the first probe
    pub batch_size: Option<usize>,
}

/// Where a fold writes its artifacts
#[derive(Debug, Clone, Copy)]
pub struct FoldJob<'a> {
    pub index: usize,
    pub dir: &'a Path,
    pub log: &'a RunLog,
}

/// Predictions of one trained fold
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    /// Softmax probabilities, `(num_test, classes)`
    pub test_predictions: Array2<f32>,
    /// Softmax probabilities, `(num_valid, classes)`, in validation order
    pub valid_predictions: Array2<f32>,
    /// Normalisation bound to every set of the fold
    pub scaler: Arc<Scaler>,
    pub result: TrainResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldState {
    Created,
    ScalerFit,
    Training,
    Converged,
    Predicting,
    Done,
}

impl fmt::Display for FoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FoldState::Created => "created",
            FoldState::ScalerFit => "scaler-fit",
            FoldState::Training => "training",
            FoldState::Converged => "converged",
            FoldState::Predicting => "predicting",
            FoldState::Done => "done",
        };
        f.write_str(name)
    }
}

struct Transitions<'a> {
    state: FoldState,
    log: &'a RunLog,
}

impl<'a> Transitions<'a> {
    fn start(log: &'a RunLog) -> Self {
        log.info(format!("state: {}", FoldState::Created));
        Self {
            state: FoldState::Created,
            log,
        }
    }

    fn advance(&mut self, next: FoldState) {
        self.log.info(format!("state: {} -> {}", self.state, next));
        self.state = next;
    }
}

pub struct FoldRunner {
    settings: FoldSettings,
}

impl FoldRunner {
    pub fn new(settings: FoldSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FoldSettings {
        &self.settings
    }

    /// Unbound adapter over the test examples, shared by every fold of a run
    pub fn test_dataset(test: &[Example], ctx: &RunContext) -> Result<AudioDataset> {
        dataset(test, false, ctx)
    }

    /// Train one fold and predict its test and validation examples
    ///
    /// `test` comes from [`FoldRunner::test_dataset`] and is left unbound.
    pub fn run(
        &self,
        job: &FoldJob<'_>,
        train: &[Example],
        valid: &[Example],
        test: &AudioDataset,
        ctx: &mut RunContext,
    ) -> Result<FoldOutcome> {
        let log = job.log;
        let mut state = Transitions::start(log);
        log.info(format!(
            "{} train / {} valid / {} test examples",
            train.len(),
            valid.len(),
            test.len()
        ));

        let mut train_set = dataset(train, true, ctx)?;
        let mut valid_set = dataset(valid, true, ctx)?;

        state.advance(FoldState::ScalerFit);
        let scaler = match ctx.extractor.external_scaler() {
            Some(scaler) => {
                log.info(format!("using the {} extractor's scaler", ctx.extractor.name()));
                scaler
            }
            None => Scaler::fit_min_max(train_set.stats())?,
        };
        let scaler = Arc::new(scaler);
        train_set.bind_scaler(Arc::clone(&scaler));
        valid_set.bind_scaler(Arc::clone(&scaler));

        let input_size = ctx
            .extractor
            .feature_dim()
            .unwrap_or(train_set.stats().feature_dim);
        let seed = self.settings.seed.wrapping_add(job.index as u64);
        let mut trainer = self.trainer(input_size, seed)?;

        let batch_size = match ctx.batch_size {
            Some(size) => size,
            None => {
                let worst_case = [&train_set, &valid_set, test]
                    .into_iter()
                    .max_by_key(|set| set.stats().max_length)
                    .map_or(train_set.longest_path(), |set| set.longest_path());
                let prober = BatchSizeProber::new(self.settings.max_batch_size, log.clone());
                let size =
                    prober.probe(&ctx.device, ctx.extractor.as_ref(), &mut trainer, worst_case)?;
                ctx.batch_size = Some(size);
                trainer = self.trainer(input_size, seed)?;
                size
            }
        };
        log.info(format!("batch size: {batch_size}"));

        trainer.add_callback(
            EarlyStopping::new(self.settings.patience, 0.0)
                .monitor_validation()
                .with_log(log.clone()),
        );
        trainer.add_callback(ProgressCallback::new(
            log.clone(),
            self.settings.train.log_interval,
        ));

        let train_loader = DataLoader::new(
            Arc::new(train_set),
            batch_size,
            Order::Shuffled { seed },
            Arc::clone(&ctx.pool),
        )?;
        let valid_loader = DataLoader::new(
            Arc::new(valid_set),
            batch_size,
            Order::Sequential,
            Arc::clone(&ctx.pool),
        )?;

        state.advance(FoldState::Training);
        let result = trainer.train(
            self.settings.epochs,
            &train_loader,
            Some(&valid_loader),
            &ctx.device,
        )?;

        state.advance(FoldState::Converged);
        if result.stopped_early {
            log.info(format!("stopped early after {} epochs", result.final_epoch));
        }
        if let (Some(epoch), Some(loss)) = (result.best_epoch, result.best_val_loss) {
            log.info(format!(
                "kept weights of epoch {} (val_loss: {:.4})",
                epoch + 1,
                loss
            ));
        }

        let artifact = job.dir.join(self.settings.model_format.file_name());
        let model = Model::from_classifier(log.scope(), trainer.model());
        save_model(&model, &artifact, &SaveConfig::new(self.settings.model_format))?;
        log.info(format!("saved model to {}", artifact.display()));

        state.advance(FoldState::Predicting);
        let test_loader = DataLoader::new(
            Arc::new(test.with_scaler(Arc::clone(&scaler))),
            batch_size,
            Order::Sequential,
            Arc::clone(&ctx.pool),
        )?;
        let test_predictions = trainer.predict(&test_loader, &ctx.device)?;
        let valid_predictions = trainer.predict(&valid_loader, &ctx.device)?;

        state.advance(FoldState::Done);
        Ok(FoldOutcome {
            test_predictions,
            valid_predictions,
            scaler,
            result,
        })
    }

    fn trainer(&self, input_size: usize, seed: u64) -> Result<Trainer> {
        let model = build_model(
            &self.settings.model,
            Some(input_size),
            self.settings.num_classes,
            seed,
        )?;
        let optimizer = build_optimizer(&self.settings.optimizer)?;
        Ok(Trainer::new(
            model,
            optimizer,
            Box::new(CrossEntropyLoss),
            self.settings.train.clone(),
        ))
    }
}

fn dataset(examples: &[Example], labelled: bool, ctx: &RunContext) -> Result<AudioDataset> {
    let paths = examples.iter().map(|e| e.path.clone()).collect();
    let labels = if labelled {
        let labels = examples
            .iter()
            .map(|e| {
                e.label.ok_or_else(|| {
                    Error::ConfigError(format!("{} has no label", e.path.display()))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Some(labels)
    } else {
        None
    };
    AudioDataset::new(paths, labels, Arc::clone(&ctx.extractor), &ctx.pool)
}
