//! Stratified k-fold splitting

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// One train/validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Zero-based fold index
    pub index: usize,
    /// Training rows, ascending
    pub train: Vec<usize>,
    /// Validation rows, ascending
    pub valid: Vec<usize>,
}

impl Fold {
    /// Directory name of the fold inside a run (`<index + 1>-fold`)
    pub fn dir_name(&self) -> String {
        fold_dir_name(self.index)
    }
}

pub fn fold_dir_name(index: usize) -> String {
    format!("{}-fold", index + 1)
}

/// Identity of a split: same fingerprint, same folds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitFingerprint {
    pub seed: u64,
    pub k: usize,
    pub rows: usize,
    /// Hex SHA-256 of the label vector
    pub labels_sha256: String,
}

impl SplitFingerprint {
    pub fn new(labels: &[usize], k: usize, seed: u64) -> Self {
        let mut hasher = Sha256::new();
        for label in labels {
            hasher.update((*label as u64).to_le_bytes());
        }
        Self {
            seed,
            k,
            rows: labels.len(),
            labels_sha256: hex::encode(hasher.finalize()),
        }
    }
}

/// All folds of a run plus their fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldPlan {
    pub folds: Vec<Fold>,
    pub fingerprint: SplitFingerprint,
}

impl FoldPlan {
    pub fn new(labels: &[usize], k: usize, seed: u64) -> Result<Self> {
        Ok(Self {
            folds: stratified_k_fold(labels, k, seed)?,
            fingerprint: SplitFingerprint::new(labels, k, seed),
        })
    }

    pub fn k(&self) -> usize {
        self.folds.len()
    }
}

/// Partition `0..labels.len()` into `k` label-stratified validation groups
///
/// Members of each class are shuffled (one ChaCha8 stream seeded with `seed`,
/// classes in ascending order) and dealt round-robin over the folds. The
/// dealing position carries over from one class to the next, so fold sizes
/// differ by at most one.
pub fn stratified_k_fold(labels: &[usize], k: usize, seed: u64) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(Error::ConfigError(format!("k must be at least 2, got {k}")));
    }
    if labels.is_empty() {
        return Err(Error::ConfigError("cannot split an empty label vector".to_string()));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }
    if let Some((class, members)) = by_class.iter().find(|(_, m)| m.len() < k) {
        return Err(Error::ConfigError(format!(
            "class {class} has {} members, fewer than k = {k}",
            members.len()
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut valid: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut cursor = 0usize;
    for members in by_class.values_mut() {
        members.shuffle(&mut rng);
        for &i in members.iter() {
            valid[cursor % k].push(i);
            cursor += 1;
        }
    }

    let n = labels.len();
    Ok(valid
        .into_iter()
        .enumerate()
        .map(|(index, mut valid)| {
            valid.sort_unstable();
            let mut in_valid = vec![false; n];
            for &i in &valid {
                in_valid[i] = true;
            }
            let train = (0..n).filter(|&i| !in_valid[i]).collect();
            Fold {
                index,
                train,
                valid,
            }
        })
        .collect())
}
