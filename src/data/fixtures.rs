//! Synthetic extractor for unit tests

use ndarray::Array2;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{AudioDataset, Scaler};
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;

/// Reads `<n>.wav` as `n` frames of two features, both equal to `n`
pub(crate) struct StemExtractor;

impl FeatureExtractor for StemExtractor {
    fn extract(&self, path: &Path) -> Result<Array2<f32>> {
        let n: usize = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Feature(format!("bad stem {}", path.display())))?;
        Ok(Array2::from_elem((n, 2), n as f32))
    }

    fn feature_dim(&self) -> Option<usize> {
        Some(2)
    }

    fn external_scaler(&self) -> Option<Scaler> {
        None
    }

    fn name(&self) -> &str {
        "stem"
    }
}

pub(crate) fn pool() -> ThreadPool {
    rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
}

/// Unbound dataset of `<stem>.wav` files labelled `stem % 2`
pub(crate) fn stem_dataset(stems: &[usize], pool: &ThreadPool) -> AudioDataset {
    let paths = stems.iter().map(|s| PathBuf::from(format!("{s}.wav"))).collect();
    let labels = Some(stems.iter().map(|s| s % 2).collect());
    AudioDataset::new(paths, labels, Arc::new(StemExtractor), pool).unwrap()
}
