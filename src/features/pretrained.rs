//! Input frames for a pretrained speech encoder
//!
//! The encoder consumes raw waveform; the clip is resampled and cut into
//! non-overlapping frames of `frame_size` samples (the tail is zero-padded).
//! Normalisation is the encoder's own per-utterance standardisation, supplied
//! as an external scaler, so no statistics are fitted per fold. The feature
//! dimension is left to the dataset.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::wav::{read_wav, resample_linear};
use super::FeatureExtractor;
use crate::data::Scaler;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedParams {
    #[serde(default = "default_sr")]
    pub sample_rate: u32,

    /// Samples per frame
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// Variance floor of the standardisation
    #[serde(default = "default_eps")]
    pub eps: f32,
}

fn default_sr() -> u32 {
    16_000
}

fn default_frame_size() -> usize {
    320
}

fn default_eps() -> f32 {
    1e-7
}

impl Default for PretrainedParams {
    fn default() -> Self {
        Self {
            sample_rate: default_sr(),
            frame_size: default_frame_size(),
            eps: default_eps(),
        }
    }
}

pub struct FramedWaveformExtractor {
    params: PretrainedParams,
}

impl FramedWaveformExtractor {
    pub fn new(params: PretrainedParams) -> Result<Self> {
        if params.frame_size == 0 {
            return Err(Error::ConfigError("frame_size must be > 0".to_string()));
        }
        if params.sample_rate == 0 {
            return Err(Error::ConfigError("sample_rate must be > 0".to_string()));
        }
        Ok(Self { params })
    }

    /// Cut a signal into zero-padded frames
    pub fn frames(&self, signal: &[f32]) -> Array2<f32> {
        let size = self.params.frame_size;
        let n_frames = signal.len().div_ceil(size).max(1);
        let mut out = Array2::<f32>::zeros((n_frames, size));
        for (i, chunk) in signal.chunks(size).enumerate() {
            for (j, &s) in chunk.iter().enumerate() {
                out[[i, j]] = s;
            }
        }
        out
    }
}

impl FeatureExtractor for FramedWaveformExtractor {
    fn extract(&self, path: &Path) -> Result<Array2<f32>> {
        let wav = read_wav(path)?;
        let signal = resample_linear(&wav.samples, wav.sample_rate, self.params.sample_rate);
        Ok(self.frames(&signal))
    }

    fn feature_dim(&self) -> Option<usize> {
        None
    }

    fn external_scaler(&self) -> Option<Scaler> {
        Some(Scaler::Standardize {
            eps: self.params.eps,
        })
    }

    fn name(&self) -> &str {
        "pretrained"
    }
}
