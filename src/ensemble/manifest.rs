//! Run manifest: the record of which folds are complete
//!
//! A fold counts as completed only once its entry, with the checksums of its
//! persisted predictions, is in `manifest.json`. Files of folds missing from
//! the manifest belong to interrupted attempts and are never read back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::cv::SplitFingerprint;
use crate::error::{Error, Result};
use crate::io::write_atomic;

pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

/// Hex SHA-256 of a byte buffer
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Identity of a run: resuming requires an identical fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub split: SplitFingerprint,
    pub num_classes: usize,
    pub num_test: usize,
}

/// One completed fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldRecord {
    /// Zero-based fold index
    pub fold: usize,
    pub valid_size: usize,
    pub test_sha256: String,
    pub valid_sha256: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub fingerprint: RunFingerprint,
    /// Batch size used by the folds, once known
    pub batch_size: Option<usize>,
    /// Completed folds, ascending
    pub folds: Vec<FoldRecord>,
}

impl Manifest {
    pub fn new(fingerprint: RunFingerprint) -> Self {
        Self {
            version: MANIFEST_VERSION,
            fingerprint,
            batch_size: None,
            folds: Vec::new(),
        }
    }

    /// Read the manifest of a run directory, if there is one
    pub fn load(run_dir: &Path) -> Result<Option<Self>> {
        let path = run_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| Error::Checkpoint(format!("invalid {}: {e}", path.display())))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::Checkpoint(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(Some(manifest))
    }

    /// Atomically replace the manifest of a run directory
    pub fn save(&self, run_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize manifest: {e}")))?;
        write_atomic(&run_dir.join(MANIFEST_FILE), content.as_bytes())
    }

    /// Refuse to continue a run with a different split or shape
    pub fn check_fingerprint(&self, current: &RunFingerprint) -> Result<()> {
        if &self.fingerprint != current {
            return Err(Error::ConfigError(format!(
                "run directory was created with a different split or data \
                 (saved k={} seed={} rows={} classes={} test={}, now k={} seed={} rows={} classes={} test={})",
                self.fingerprint.split.k,
                self.fingerprint.split.seed,
                self.fingerprint.split.rows,
                self.fingerprint.num_classes,
                self.fingerprint.num_test,
                current.split.k,
                current.split.seed,
                current.split.rows,
                current.num_classes,
                current.num_test,
            )));
        }
        Ok(())
    }

    /// Add or replace a fold entry
    pub fn record(&mut self, record: FoldRecord) {
        if let Some(existing) = self.folds.iter_mut().find(|r| r.fold == record.fold) {
            *existing = record;
        } else {
            self.folds.push(record);
            self.folds.sort_by_key(|r| r.fold);
        }
    }

    /// Drop a fold entry, returning whether it was present
    pub fn retract(&mut self, fold: usize) -> bool {
        let before = self.folds.len();
        self.folds.retain(|r| r.fold != fold);
        self.folds.len() != before
    }

    pub fn find(&self, fold: usize) -> Option<&FoldRecord> {
        self.folds.iter().find(|r| r.fold == fold)
    }

    pub fn is_completed(&self, fold: usize) -> bool {
        self.find(fold).is_some()
    }

    /// Lowest fold index without an entry
    pub fn next_fold(&self) -> usize {
        (0..).find(|&i| !self.is_completed(i)).unwrap_or(0)
    }

    /// Whether every fold of the split is recorded
    pub fn is_complete(&self) -> bool {
        (0..self.fingerprint.split.k).all(|i| self.is_completed(i))
    }

    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }
}
