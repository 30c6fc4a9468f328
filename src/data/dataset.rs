//! Audio dataset adapter
//!
//! Wraps a list of files (and optional labels) behind a feature extractor.
//! Construction extracts every item once to gather [`CorpusStats`]; features
//! are re-extracted on every access afterwards. Adapters start unbound and
//! refuse to serve items until a scaler is bound.

use ndarray::Array2;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::scaler::feature_bounds;
use super::Scaler;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;

/// Corpus-level statistics gathered at construction
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusStats {
    /// Per-feature minimum over all frames of all items
    pub min: Vec<f32>,
    /// Per-feature maximum over all frames of all items
    pub max: Vec<f32>,
    /// Largest frame count
    pub max_length: usize,
    /// Index of the item with `max_length` frames (first on ties)
    pub longest: usize,
    pub feature_dim: usize,
}

impl CorpusStats {
    fn of_item(index: usize, features: &Array2<f32>) -> Self {
        let (min, max) = feature_bounds(features);
        Self {
            feature_dim: features.ncols(),
            min,
            max,
            max_length: features.nrows(),
            longest: index,
        }
    }

    fn merge(self, other: Self) -> Result<Self> {
        if self.feature_dim != other.feature_dim {
            return Err(Error::ShapeMismatch {
                expected: vec![self.feature_dim],
                got: vec![other.feature_dim],
            });
        }
        let (max_length, longest) = if other.max_length > self.max_length
            || (other.max_length == self.max_length && other.longest < self.longest)
        {
            (other.max_length, other.longest)
        } else {
            (self.max_length, self.longest)
        };
        Ok(Self {
            min: self.min.iter().zip(&other.min).map(|(a, b)| a.min(*b)).collect(),
            max: self.max.iter().zip(&other.max).map(|(a, b)| a.max(*b)).collect(),
            max_length,
            longest,
            feature_dim: self.feature_dim,
        })
    }
}

/// Dataset adapter over audio files
#[derive(Clone)]
pub struct AudioDataset {
    paths: Vec<PathBuf>,
    labels: Option<Vec<usize>>,
    extractor: Arc<dyn FeatureExtractor>,
    stats: CorpusStats,
    scaler: Option<Arc<Scaler>>,
}

impl AudioDataset {
    /// Build an unbound adapter, extracting every item once for statistics
    pub fn new(
        paths: Vec<PathBuf>,
        labels: Option<Vec<usize>>,
        extractor: Arc<dyn FeatureExtractor>,
        pool: &ThreadPool,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::ConfigError("dataset has no items".to_string()));
        }
        if let Some(labels) = &labels {
            if labels.len() != paths.len() {
                return Err(Error::ShapeMismatch {
                    expected: vec![paths.len()],
                    got: vec![labels.len()],
                });
            }
        }

        let stats = pool
            .install(|| {
                paths
                    .par_iter()
                    .enumerate()
                    .map(|(i, path)| {
                        extractor
                            .extract(path)
                            .map(|features| CorpusStats::of_item(i, &features))
                    })
                    .try_reduce_with(|a, b| a.merge(b))
            })
            .ok_or_else(|| Error::ConfigError("dataset has no items".to_string()))??;

        Ok(Self {
            paths,
            labels,
            extractor,
            stats,
            scaler: None,
        })
    }

    /// Bind the normalisation used by `item`
    pub fn bind_scaler(&mut self, scaler: Arc<Scaler>) {
        self.scaler = Some(scaler);
    }

    /// Copy of this adapter bound to `scaler`, keeping the gathered statistics
    pub fn with_scaler(&self, scaler: Arc<Scaler>) -> Self {
        Self {
            scaler: Some(scaler),
            ..self.clone()
        }
    }

    pub fn is_bound(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn stats(&self) -> &CorpusStats {
        &self.stats
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    /// Path of the item with the most frames
    pub fn longest_path(&self) -> &Path {
        &self.paths[self.stats.longest]
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.labels.as_ref().and_then(|l| l.get(index).copied())
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    pub fn extractor(&self) -> &Arc<dyn FeatureExtractor> {
        &self.extractor
    }

    /// Scaled features and label of item `index`
    pub fn item(&self, index: usize) -> Result<(Array2<f32>, Option<usize>)> {
        let scaler = self.scaler.as_ref().ok_or(Error::ScalerNotBound)?;
        let path = self.paths.get(index).ok_or_else(|| {
            Error::InvalidParameter(format!(
                "item {index} out of range for dataset of {}",
                self.paths.len()
            ))
        })?;
        let features = scaler.transform(self.extractor.extract(path)?)?;
        Ok((features, self.label(index)))
    }
}

impl std::fmt::Debug for AudioDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDataset")
            .field("len", &self.paths.len())
            .field("labelled", &self.labels.is_some())
            .field("extractor", &self.extractor.name())
            .field("stats", &self.stats)
            .field("bound", &self.scaler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{pool, stem_dataset, StemExtractor};
    use ndarray::array;

    fn dataset(stems: &[usize]) -> AudioDataset {
        stem_dataset(stems, &pool())
    }

    #[test]
    fn test_stats_computed_at_construction() {
        let ds = dataset(&[2, 5, 3, 5]);
        let stats = ds.stats();
        assert_eq!(stats.max_length, 5);
        assert_eq!(stats.longest, 1);
        assert_eq!(stats.min, vec![2.0, 2.0]);
        assert_eq!(stats.max, vec![5.0, 5.0]);
        assert_eq!(ds.longest_path(), Path::new("5.wav"));
    }

    #[test]
    fn test_unbound_item_fails() {
        let ds = dataset(&[1, 2]);
        assert!(matches!(ds.item(0), Err(Error::ScalerNotBound)));
    }

    #[test]
    fn test_with_scaler_leaves_original_unbound() {
        let ds = dataset(&[1, 2]);
        let bound = ds.with_scaler(Arc::new(Scaler::Identity));

        assert!(!ds.is_bound());
        assert!(bound.is_bound());
        assert_eq!(bound.stats(), ds.stats());
        assert_eq!(bound.item(1).unwrap().0, Array2::from_elem((2, 2), 2.0));
    }

    #[test]
    fn test_bound_item_is_scaled() {
        let mut ds = dataset(&[1, 3]);
        let scaler = Scaler::fit_min_max(ds.stats()).unwrap();
        ds.bind_scaler(Arc::new(scaler));

        let (features, label) = ds.item(1).unwrap();
        assert_eq!(features.dim(), (3, 2));
        assert_eq!(features[[0, 0]], 1.0);
        assert_eq!(label, Some(1));

        let (features, _) = ds.item(0).unwrap();
        assert_eq!(features, array![[0.0, 0.0]]);
    }

    #[test]
    fn test_identity_scaler_passthrough() {
        let mut ds = dataset(&[4]);
        ds.bind_scaler(Arc::new(Scaler::Identity));
        let (features, _) = ds.item(0).unwrap();
        assert_eq!(features[[0, 0]], 4.0);
    }

    #[test]
    fn test_extraction_error_surfaces() {
        let paths = vec![PathBuf::from("x.wav")];
        let err = AudioDataset::new(paths, None, Arc::new(StemExtractor), &pool()).unwrap_err();
        assert!(matches!(err, Error::Feature(_)));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = AudioDataset::new(vec![], None, Arc::new(StemExtractor), &pool()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
