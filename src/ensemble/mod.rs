//! Fold ensembling and the incremental checkpoint of a run
//!
//! Each fold's test and validation probabilities are stored separately in
//! its directory. `sum.csv` and `for_stacking_input.csv` are derived views,
//! rewritten after every change; `manifest.json` decides which folds count.
//! Running a fold again replaces its contribution rather than adding to it.

mod checkpoint;
mod manifest;
mod submission;

pub use checkpoint::{
    class_columns, load_checkpoint, parse_predictions, predictions_csv, test_predictions_path,
    valid_predictions_path, Checkpoint,
};
pub use manifest::{sha256_hex, FoldRecord, Manifest, RunFingerprint, MANIFEST_FILE};
pub use submission::{finalize, oof_table, submission_table, sum_table, write_submission};

use chrono::Utc;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::Table;
use crate::error::{Error, Result};
use crate::io::write_atomic;

pub const SUM_FILE: &str = "sum.csv";
pub const OOF_FILE: &str = "for_stacking_input.csv";
pub const SUBMISSION_FILE: &str = "prediction.csv";

#[derive(Debug, Clone, Default)]
struct Staged {
    test_sha256: Option<String>,
    valid_sha256: Option<String>,
    valid_size: usize,
}

/// Running ensemble state of one run directory
pub struct Ensemble {
    run_dir: PathBuf,
    template: Table,
    manifest: Manifest,
    state: Checkpoint,
    staged: BTreeMap<usize, Staged>,
}

impl Ensemble {
    /// Start a new run in `run_dir`, writing an empty manifest
    pub fn create(
        run_dir: &Path,
        template: Table,
        fingerprint: RunFingerprint,
        num_train: usize,
    ) -> Result<Self> {
        if template.len() != fingerprint.num_test {
            return Err(Error::ConfigError(format!(
                "submission template has {} rows, test table has {}",
                template.len(),
                fingerprint.num_test
            )));
        }
        let state = Checkpoint::empty(num_train, fingerprint.num_classes);
        let manifest = Manifest::new(fingerprint);
        manifest.save(run_dir)?;
        Ok(Self {
            run_dir: run_dir.to_path_buf(),
            template,
            manifest,
            state,
            staged: BTreeMap::new(),
        })
    }

    /// Reopen a run, rebuilding its state from the committed folds
    pub fn resume(
        run_dir: &Path,
        template: Table,
        fingerprint: RunFingerprint,
        num_train: usize,
    ) -> Result<Self> {
        let manifest = Manifest::load(run_dir)?.ok_or_else(|| {
            Error::Checkpoint(format!("{} has no {MANIFEST_FILE}", run_dir.display()))
        })?;
        manifest.check_fingerprint(&fingerprint)?;
        if template.len() != fingerprint.num_test {
            return Err(Error::ConfigError(format!(
                "submission template has {} rows, test table has {}",
                template.len(),
                fingerprint.num_test
            )));
        }
        let state = load_checkpoint(run_dir, &manifest, num_train)?;
        let ensemble = Self {
            run_dir: run_dir.to_path_buf(),
            template,
            manifest,
            state,
            staged: BTreeMap::new(),
        };
        // Views may still hold a fold that never committed
        ensemble.write_sum()?;
        ensemble.write_oof()?;
        Ok(ensemble)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn classes(&self) -> usize {
        self.manifest.fingerprint.num_classes
    }

    fn num_test(&self) -> usize {
        self.manifest.fingerprint.num_test
    }

    /// Persist the batch size the folds train with
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if self.manifest.batch_size != Some(batch_size) {
            self.manifest.batch_size = Some(batch_size);
            self.manifest.save(&self.run_dir)?;
        }
        Ok(())
    }

    /// Sum of the current fold contributions, `(num_test, classes)`
    pub fn running_sum(&self) -> Array2<f32> {
        self.state.running_sum(self.num_test(), self.classes())
    }

    /// Out-of-fold probabilities, NaN where no fold has written yet
    pub fn oof(&self) -> &Array2<f32> {
        &self.state.oof
    }

    pub fn oof_folds(&self) -> &[Option<usize>] {
        &self.state.oof_fold
    }

    /// Folds whose test predictions are part of the running sum
    pub fn contributing_folds(&self) -> Vec<usize> {
        self.state.contributions.keys().copied().collect()
    }

    /// A fold being rewritten stops counting as completed first
    fn reopen(&mut self, fold: usize) -> Result<()> {
        if self.manifest.retract(fold) {
            self.manifest.save(&self.run_dir)?;
        }
        Ok(())
    }

    /// Store a fold's test probabilities and rewrite `sum.csv`
    pub fn accumulate(&mut self, fold: usize, test_predictions: &Array2<f32>) -> Result<()> {
        let expected = (self.num_test(), self.classes());
        if test_predictions.dim() != expected {
            return Err(Error::ShapeMismatch {
                expected: vec![expected.0, expected.1],
                got: vec![test_predictions.nrows(), test_predictions.ncols()],
            });
        }
        self.reopen(fold)?;

        let path = test_predictions_path(&self.run_dir, fold);
        create_parent(&path)?;
        let bytes = predictions_csv(test_predictions, None)?;
        write_atomic(&path, &bytes)?;
        self.staged.entry(fold).or_default().test_sha256 = Some(sha256_hex(&bytes));

        self.state
            .contributions
            .insert(fold, test_predictions.clone());
        self.write_sum()
    }

    /// Store a fold's validation probabilities and rewrite the OOF table
    pub fn record_oof(
        &mut self,
        fold: usize,
        valid_indices: &[usize],
        valid_predictions: &Array2<f32>,
    ) -> Result<()> {
        let num_train = self.state.oof.nrows();
        if valid_predictions.dim() != (valid_indices.len(), self.classes()) {
            return Err(Error::ShapeMismatch {
                expected: vec![valid_indices.len(), self.classes()],
                got: vec![valid_predictions.nrows(), valid_predictions.ncols()],
            });
        }
        if let Some(&bad) = valid_indices.iter().find(|&&i| i >= num_train) {
            return Err(Error::InvalidParameter(format!(
                "validation row {bad} outside [0, {num_train})"
            )));
        }
        self.reopen(fold)?;

        let path = valid_predictions_path(&self.run_dir, fold);
        create_parent(&path)?;
        let bytes = predictions_csv(valid_predictions, Some(valid_indices))?;
        write_atomic(&path, &bytes)?;
        let staged = self.staged.entry(fold).or_default();
        staged.valid_sha256 = Some(sha256_hex(&bytes));
        staged.valid_size = valid_indices.len();

        for (row, slot) in self.state.oof_fold.iter_mut().enumerate() {
            if *slot == Some(fold) {
                *slot = None;
                self.state.oof.row_mut(row).fill(f32::NAN);
            }
        }
        for (row, &i) in valid_indices.iter().enumerate() {
            self.state.oof.row_mut(i).assign(&valid_predictions.row(row));
            self.state.oof_fold[i] = Some(fold);
        }
        self.write_oof()
    }

    /// Mark a fold completed once both of its prediction files are written
    pub fn commit_fold(&mut self, fold: usize) -> Result<FoldRecord> {
        let staged = self.staged.remove(&fold).unwrap_or_default();
        let (Some(test_sha256), Some(valid_sha256)) = (staged.test_sha256, staged.valid_sha256)
        else {
            return Err(Error::Checkpoint(format!(
                "fold {} cannot be committed before its predictions are recorded",
                fold + 1
            )));
        };
        let record = FoldRecord {
            fold,
            valid_size: staged.valid_size,
            test_sha256,
            valid_sha256,
            completed_at: Utc::now(),
        };
        self.manifest.record(record.clone());
        self.manifest.save(&self.run_dir)?;
        Ok(record)
    }

    /// Whether every fold of the split has been committed
    pub fn is_complete(&self) -> bool {
        self.manifest.is_complete()
    }

    /// Write `prediction.csv` from the committed folds
    pub fn finalize(&self) -> Result<PathBuf> {
        if !self.is_complete() {
            return Err(Error::Checkpoint(format!(
                "{} of {} folds committed",
                self.manifest.len(),
                self.manifest.fingerprint.split.k
            )));
        }
        let path = self.run_dir.join(SUBMISSION_FILE);
        write_submission(&path, &self.template, &self.running_sum())?;
        Ok(path)
    }

    fn write_sum(&self) -> Result<()> {
        let table = sum_table(&self.template, &self.running_sum())?;
        write_atomic(&self.run_dir.join(SUM_FILE), &table.to_csv()?)
    }

    fn write_oof(&self) -> Result<()> {
        let table = oof_table(&self.state.oof, &self.state.oof_fold)?;
        write_atomic(&self.run_dir.join(OOF_FILE), &table.to_csv()?)
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
