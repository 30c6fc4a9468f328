//! Feature normalisation

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::CorpusStats;
use crate::error::{Error, Result};

/// Normalisation applied to every item of a fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    /// Pass-through
    Identity,

    /// Per-feature min-max to `[0, 1]`, fitted on a fold's training split
    MinMax { min: Vec<f32>, max: Vec<f32> },

    /// Per-utterance zero mean / unit variance
    Standardize { eps: f32 },
}

impl Scaler {
    /// Fit a min-max scaler from corpus statistics
    pub fn fit_min_max(stats: &CorpusStats) -> Result<Self> {
        if stats.min.len() != stats.max.len() || stats.min.is_empty() {
            return Err(Error::ShapeMismatch {
                expected: vec![stats.min.len()],
                got: vec![stats.max.len()],
            });
        }
        Ok(Scaler::MinMax {
            min: stats.min.clone(),
            max: stats.max.clone(),
        })
    }

    /// Whether this scaler needs fitting statistics
    pub fn is_fitted(&self) -> bool {
        matches!(self, Scaler::MinMax { .. })
    }

    pub fn transform(&self, features: Array2<f32>) -> Result<Array2<f32>> {
        match self {
            Scaler::Identity => Ok(features),
            Scaler::MinMax { min, max } => {
                if features.ncols() != min.len() {
                    return Err(Error::ShapeMismatch {
                        expected: vec![features.nrows(), min.len()],
                        got: vec![features.nrows(), features.ncols()],
                    });
                }
                let min = Array1::from(min.clone());
                // Constant features map to zero
                let range = Array1::from(
                    max.iter()
                        .zip(min.iter())
                        .map(|(hi, lo)| if hi > lo { hi - lo } else { 1.0 })
                        .collect::<Vec<_>>(),
                );
                Ok((features - &min) / &range)
            }
            Scaler::Standardize { eps } => {
                let n = features.len();
                if n == 0 {
                    return Ok(features);
                }
                let mean = features.sum() / n as f32;
                let var = features.mapv(|v| (v - mean).powi(2)).sum() / n as f32;
                let denom = (var + eps).sqrt();
                Ok(features.mapv(|v| (v - mean) / denom))
            }
        }
    }
}

/// Per-feature minimum and maximum of one item
pub(crate) fn feature_bounds(features: &Array2<f32>) -> (Vec<f32>, Vec<f32>) {
    let min = features
        .axis_iter(Axis(1))
        .map(|col| col.iter().copied().fold(f32::INFINITY, f32::min))
        .collect();
    let max = features
        .axis_iter(Axis(1))
        .map(|col| col.iter().copied().fold(f32::NEG_INFINITY, f32::max))
        .collect();
    (min, max)
}
