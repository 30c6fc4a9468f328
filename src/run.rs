//! Cross-validated run orchestration
//!
//! A run directory holds everything needed to continue after a failure: the
//! resolved configuration, the manifest of committed folds and each fold's
//! predictions. Folds are trained strictly in order; a fold that fails
//! aborts the run and leaves the committed folds resumable.
//!
//! ```no_run
//! use foldwise::config::load_config;
//! use foldwise::run::{run, RunOptions};
//!
//! let spec = load_config("config.yaml")?;
//! let summary = run(&spec, &RunOptions::default())?;
//! println!("results in {}", summary.run_dir.display());
//! # Ok::<(), foldwise::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{build_device, build_fold_settings, RunSpec};
use crate::cv::FoldPlan;
use crate::data::{class_counts, read_test_table, read_train_table, Example, Table};
use crate::ensemble::{Ensemble, RunFingerprint};
use crate::error::{Error, Result};
use crate::features::build_extractor;
use crate::io::write_atomic;
use crate::logging::RunLog;
use crate::train::{FoldJob, FoldRunner, RunContext};

pub const CONFIG_FILE: &str = "config.yaml";
pub const LOG_FILE: &str = "log.log";

/// How an invocation relates to earlier ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip the first N folds of an existing run (0 = fresh run)
    pub continue_train: usize,
    /// Run directory to continue
    pub continue_from: Option<PathBuf>,
    /// Continue from the first fold the manifest lacks
    pub resume: bool,
    /// Train at most this many folds in this invocation
    pub max_folds: Option<usize>,
}

impl RunOptions {
    fn is_continuation(&self) -> bool {
        self.continue_train > 0 || self.resume
    }

    fn check(&self) -> Result<()> {
        if self.resume && self.continue_train > 0 {
            return Err(Error::ConfigError(
                "--resume and --continue-train are mutually exclusive".to_string(),
            ));
        }
        match (&self.continue_from, self.is_continuation()) {
            (None, true) => Err(Error::ConfigError(
                "continuing a run requires --continue-from <DIR>".to_string(),
            )),
            (Some(_), false) => Err(Error::ConfigError(
                "--continue-from needs --continue-train N or --resume".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// What an invocation did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    /// Folds trained by this invocation
    pub trained: Vec<usize>,
    /// Folds skipped as already done
    pub skipped: Vec<usize>,
    pub batch_size: Option<usize>,
    /// `prediction.csv`, once every fold is committed
    pub submission: Option<PathBuf>,
}

/// Directory of a fresh run: `<result_path>/<model>_<n>`
///
/// `n` is the number of entries already in `result_path`.
pub fn fresh_run_dir(result_path: &Path, model: &str) -> Result<PathBuf> {
    fs::create_dir_all(result_path)?;
    let n = fs::read_dir(result_path)?.count();
    Ok(result_path.join(format!("{model}_{n}")))
}

struct Inputs {
    train: Vec<Example>,
    test: Vec<Example>,
    template: Table,
}

fn load_inputs(spec: &RunSpec) -> Result<Inputs> {
    let root = spec.data.root.as_deref();
    Ok(Inputs {
        train: read_train_table(&spec.data.train, root, spec.data.num_classes)?,
        test: read_test_table(&spec.data.test, root)?,
        template: Table::read(&spec.data.submission)?,
    })
}

/// Load the input tables and compute the fold plan without training
pub fn plan(spec: &RunSpec) -> Result<(FoldPlan, usize, usize)> {
    let inputs = load_inputs(spec)?;
    let labels = labels(&inputs.train)?;
    let plan = FoldPlan::new(&labels, spec.cv.k, spec.cv.seed)?;
    Ok((plan, inputs.train.len(), inputs.test.len()))
}

fn labels(examples: &[Example]) -> Result<Vec<usize>> {
    examples
        .iter()
        .map(|e| {
            e.label
                .ok_or_else(|| Error::ConfigError(format!("{} has no label", e.path.display())))
        })
        .collect()
}

fn subset(examples: &[Example], indices: &[usize]) -> Vec<Example> {
    indices.iter().map(|&i| examples[i].clone()).collect()
}

/// Train every pending fold of a run and write the ensemble outputs
pub fn run(spec: &RunSpec, options: &RunOptions) -> Result<RunSummary> {
    options.check()?;

    let run_dir = match &options.continue_from {
        Some(dir) if options.is_continuation() => {
            if !dir.is_dir() {
                return Err(Error::ConfigError(format!(
                    "run directory {} does not exist",
                    dir.display()
                )));
            }
            dir.clone()
        }
        _ => {
            let dir = fresh_run_dir(&spec.output.result_path, spec.model.kind.as_str())?;
            fs::create_dir(&dir)?;
            let yaml = serde_yaml::to_string(spec)
                .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?;
            write_atomic(&dir.join(CONFIG_FILE), yaml.as_bytes())?;
            dir
        }
    };

    let log = RunLog::create(run_dir.join(LOG_FILE), "run")?;
    log.info(format!("run directory: {}", run_dir.display()));

    let inputs = load_inputs(spec)?;
    let labels = labels(&inputs.train)?;
    let mut counts: Vec<(usize, usize)> = class_counts(&inputs.train).into_iter().collect();
    counts.sort_unstable();
    log.info(format!(
        "{} training / {} test examples, class counts {:?}",
        inputs.train.len(),
        inputs.test.len(),
        counts
    ));

    let plan = FoldPlan::new(&labels, spec.cv.k, spec.cv.seed)?;
    let fingerprint = RunFingerprint {
        split: plan.fingerprint.clone(),
        num_classes: spec.data.num_classes,
        num_test: inputs.test.len(),
    };

    let mut ensemble = if options.is_continuation() {
        Ensemble::resume(&run_dir, inputs.template, fingerprint, inputs.train.len())?
    } else {
        Ensemble::create(&run_dir, inputs.template, fingerprint, inputs.train.len())?
    };

    let cursor = if options.resume {
        ensemble.manifest().next_fold()
    } else {
        options.continue_train
    };
    if cursor > plan.k() {
        return Err(Error::ConfigError(format!(
            "cannot skip {cursor} folds of a {}-fold run",
            plan.k()
        )));
    }
    if let Some(missing) = (0..cursor).find(|&i| !ensemble.manifest().is_completed(i)) {
        return Err(Error::ConfigError(format!(
            "fold {} never completed; continue from at most {missing} folds",
            missing + 1
        )));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(spec.training.num_workers.max(1))
        .build()
        .map_err(|e| Error::ConfigError(format!("cannot start data loader threads: {e}")))?;
    let mut ctx = RunContext {
        device: build_device(spec),
        extractor: build_extractor(&spec.features)?,
        pool: Arc::new(pool),
        batch_size: spec.training.batch_size.or(ensemble.manifest().batch_size),
    };
    log.info(format!(
        "device {}, {} features, {} model",
        ctx.device.name,
        ctx.extractor.name(),
        spec.model.kind
    ));

    let runner = FoldRunner::new(build_fold_settings(spec));
    let test_set = FoldRunner::test_dataset(&inputs.test, &ctx)?;
    let mut summary = RunSummary {
        run_dir: run_dir.clone(),
        trained: Vec::new(),
        skipped: Vec::new(),
        batch_size: ctx.batch_size,
        submission: None,
    };

    for fold in &plan.folds {
        let done = ensemble.manifest().is_completed(fold.index);
        if fold.index < cursor || (options.resume && done) {
            log.info(format!("skipping {}", fold.dir_name()));
            summary.skipped.push(fold.index);
            continue;
        }
        if options.max_folds.is_some_and(|max| summary.trained.len() >= max) {
            log.info(format!(
                "stopping after {} folds; continue with --resume",
                summary.trained.len()
            ));
            break;
        }

        let fold_dir = run_dir.join(fold.dir_name());
        fs::create_dir_all(&fold_dir)?;
        let fold_log = log.child(fold_dir.join(LOG_FILE), fold.dir_name())?;
        fold_log.info(format!("start training of {}", fold.dir_name()));

        let job = FoldJob {
            index: fold.index,
            dir: &fold_dir,
            log: &fold_log,
        };
        let outcome = runner
            .run(
                &job,
                &subset(&inputs.train, &fold.train),
                &subset(&inputs.train, &fold.valid),
                &test_set,
                &mut ctx,
            )
            .inspect_err(|e| fold_log.error(format!("fold failed: {e}")))?;

        ensemble.accumulate(fold.index, &outcome.test_predictions)?;
        ensemble.record_oof(fold.index, &fold.valid, &outcome.valid_predictions)?;
        if let Some(size) = ctx.batch_size {
            ensemble.set_batch_size(size)?;
        }
        ensemble.commit_fold(fold.index)?;
        fold_log.info(format!(
            "committed after {} epochs (best val_loss: {})",
            outcome.result.final_epoch,
            outcome
                .result
                .best_val_loss
                .map(|l| format!("{l:.4}"))
                .unwrap_or_else(|| "n/a".to_string())
        ));
        summary.trained.push(fold.index);
    }
    summary.batch_size = ctx.batch_size;

    if ensemble.is_complete() {
        let path = ensemble.finalize()?;
        log.info(format!("wrote {}", path.display()));
        summary.submission = Some(path);
    } else {
        log.info(format!(
            "{} of {} folds committed",
            ensemble.manifest().len(),
            plan.k()
        ));
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_run_dir_counts_entries() {
        let dir = TempDir::new().unwrap();
        let result = dir.path().join("result");
        assert_eq!(fresh_run_dir(&result, "mlp").unwrap(), result.join("mlp_0"));

        fs::create_dir(result.join("mlp_0")).unwrap();
        fs::write(result.join("notes.txt"), "x").unwrap();
        assert_eq!(fresh_run_dir(&result, "linear").unwrap(), result.join("linear_2"));
    }

    #[test]
    fn test_option_conflicts() {
        let resume_without_dir = RunOptions {
            resume: true,
            ..Default::default()
        };
        assert!(resume_without_dir.check().is_err());

        let dir_without_mode = RunOptions {
            continue_from: Some(PathBuf::from("result/mlp_0")),
            ..Default::default()
        };
        assert!(dir_without_mode.check().is_err());

        let both = RunOptions {
            continue_train: 2,
            continue_from: Some(PathBuf::from("result/mlp_0")),
            resume: true,
            max_folds: None,
        };
        assert!(both.check().is_err());

        assert!(RunOptions::default().check().is_ok());
    }
}
