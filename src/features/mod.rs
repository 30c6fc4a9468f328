//! Feature extraction collaborators
//!
//! An extractor turns one audio file into a `(frames, features)` matrix.
//! Extraction is repeated on every dataset access, so implementations must be
//! deterministic and shareable across loader threads.

mod pretrained;
mod spectral;
pub mod wav;

pub use pretrained::{FramedWaveformExtractor, PretrainedParams};
pub use spectral::{MfccExtractor, SpectralParams};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::data::Scaler;
use crate::error::Result;

/// Turns an audio file into a frame-by-feature matrix
pub trait FeatureExtractor: Send + Sync {
    /// Extract features for one file, shape `(frames, features)`
    fn extract(&self, path: &Path) -> Result<Array2<f32>>;

    /// Feature dimension if known without looking at data
    fn feature_dim(&self) -> Option<usize>;

    /// Normalisation the extractor requires instead of a fitted scaler
    fn external_scaler(&self) -> Option<Scaler>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Feature pipeline selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureSpec {
    /// MFCCs from the waveform
    Spectral(SpectralParams),
    /// Normalised waveform frames for a pretrained encoder
    Pretrained(PretrainedParams),
}

impl Default for FeatureSpec {
    fn default() -> Self {
        FeatureSpec::Spectral(SpectralParams::default())
    }
}

impl FeatureSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureSpec::Spectral(_) => "spectral",
            FeatureSpec::Pretrained(_) => "pretrained",
        }
    }
}

/// Build the extractor described by `spec`
pub fn build_extractor(spec: &FeatureSpec) -> Result<Arc<dyn FeatureExtractor>> {
    Ok(match spec {
        FeatureSpec::Spectral(params) => Arc::new(MfccExtractor::new(params.clone())?),
        FeatureSpec::Pretrained(params) => {
            Arc::new(FramedWaveformExtractor::new(params.clone())?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_yaml() {
        let yaml = "kind: spectral\nsample_rate: 8000\nn_mfcc: 13\nn_mels: 20\n";
        let spec: FeatureSpec = serde_yaml::from_str(yaml).unwrap();
        match &spec {
            FeatureSpec::Spectral(p) => {
                assert_eq!(p.sample_rate, 8000);
                assert_eq!(p.n_mfcc, 13);
                assert_eq!(p.n_fft, 512);
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert_eq!(spec.kind(), "spectral");
    }

    #[test]
    fn test_build_extractor_kinds() {
        let spectral = build_extractor(&FeatureSpec::default()).unwrap();
        assert_eq!(spectral.name(), "spectral");
        assert_eq!(spectral.feature_dim(), Some(40));
        assert!(spectral.external_scaler().is_none());

        let pretrained =
            build_extractor(&FeatureSpec::Pretrained(PretrainedParams::default())).unwrap();
        assert_eq!(pretrained.name(), "pretrained");
        assert!(pretrained.feature_dim().is_none());
        assert!(pretrained.external_scaler().is_some());
    }
}
