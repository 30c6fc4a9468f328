//! Hand-crafted spectral features (MFCC)
//!
//! Pipeline per clip: decode → resample → centre-pad → Hann-windowed frames →
//! power spectrum (radix-2 FFT) → mel filterbank → dB → DCT-II.
//! Output shape is `(frames, n_mfcc)`.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::Path;

use super::wav::{read_wav, resample_linear};
use super::FeatureExtractor;
use crate::data::Scaler;
use crate::error::{Error, Result};

/// Parameters of the MFCC pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralParams {
    /// Target sample rate; input audio is resampled to it
    #[serde(default = "default_sr")]
    pub sample_rate: u32,

    /// FFT size (power of two)
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,

    /// Window length (<= n_fft)
    #[serde(default = "default_n_fft")]
    pub win_length: usize,

    /// Hop between frames
    #[serde(default = "default_hop")]
    pub hop_length: usize,

    /// Number of mel bands
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,

    /// Number of cepstral coefficients kept
    #[serde(default = "default_n_mfcc")]
    pub n_mfcc: usize,
}

fn default_sr() -> u32 {
    16_000
}

fn default_n_fft() -> usize {
    512
}

fn default_hop() -> usize {
    160
}

fn default_n_mels() -> usize {
    64
}

fn default_n_mfcc() -> usize {
    40
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self {
            sample_rate: default_sr(),
            n_fft: default_n_fft(),
            win_length: default_n_fft(),
            hop_length: default_hop(),
            n_mels: default_n_mels(),
            n_mfcc: default_n_mfcc(),
        }
    }
}

impl SpectralParams {
    /// Check parameter consistency
    pub fn check(&self) -> Result<()> {
        if self.n_fft < 2 || !self.n_fft.is_power_of_two() {
            return Err(Error::ConfigError(format!(
                "n_fft must be a power of two, got {}",
                self.n_fft
            )));
        }
        if self.win_length == 0 || self.win_length > self.n_fft {
            return Err(Error::ConfigError(format!(
                "win_length must be in 1..={}, got {}",
                self.n_fft, self.win_length
            )));
        }
        if self.hop_length == 0 {
            return Err(Error::ConfigError("hop_length must be > 0".to_string()));
        }
        if self.n_mels == 0 || self.n_mfcc == 0 || self.n_mfcc > self.n_mels {
            return Err(Error::ConfigError(format!(
                "need 0 < n_mfcc ({}) <= n_mels ({})",
                self.n_mfcc, self.n_mels
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::ConfigError("sample_rate must be > 0".to_string()));
        }
        Ok(())
    }
}

/// MFCC extractor with precomputed window, filterbank and DCT basis
pub struct MfccExtractor {
    params: SpectralParams,
    window: Vec<f32>,
    mel_basis: Array2<f32>,
    dct_basis: Array2<f32>,
}

impl MfccExtractor {
    pub fn new(params: SpectralParams) -> Result<Self> {
        params.check()?;
        let window = hann_window(params.win_length, params.n_fft);
        let mel_basis = mel_filterbank(params.sample_rate, params.n_fft, params.n_mels);
        let dct_basis = dct_matrix(params.n_mfcc, params.n_mels);
        Ok(Self {
            params,
            window,
            mel_basis,
            dct_basis,
        })
    }

    pub fn params(&self) -> &SpectralParams {
        &self.params
    }

    /// MFCCs of an already decoded signal at the configured rate
    pub fn mfcc(&self, signal: &[f32]) -> Array2<f32> {
        let n_fft = self.params.n_fft;
        let hop = self.params.hop_length;
        let pad = n_fft / 2;

        let mut padded = vec![0.0f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let n_frames = 1 + padded.len().saturating_sub(n_fft) / hop;
        let n_bins = n_fft / 2 + 1;
        let mut power = Array2::<f32>::zeros((n_frames, n_bins));

        let mut re = vec![0.0f32; n_fft];
        let mut im = vec![0.0f32; n_fft];
        for f in 0..n_frames {
            let start = f * hop;
            for i in 0..n_fft {
                re[i] = padded.get(start + i).copied().unwrap_or(0.0) * self.window[i];
                im[i] = 0.0;
            }
            fft_in_place(&mut re, &mut im);
            for k in 0..n_bins {
                power[[f, k]] = re[k] * re[k] + im[k] * im[k];
            }
        }

        // (frames, bins) x (bins, mels)
        let mel = power.dot(&self.mel_basis.t());
        let log_mel = mel.mapv(|v| 10.0 * v.max(1e-10).log10());
        // (frames, mels) x (mels, mfcc)
        log_mel.dot(&self.dct_basis.t())
    }
}

impl FeatureExtractor for MfccExtractor {
    fn extract(&self, path: &Path) -> Result<Array2<f32>> {
        let wav = read_wav(path)?;
        let signal = resample_linear(&wav.samples, wav.sample_rate, self.params.sample_rate);
        Ok(self.mfcc(&signal))
    }

    fn feature_dim(&self) -> Option<usize> {
        Some(self.params.n_mfcc)
    }

    fn external_scaler(&self) -> Option<Scaler> {
        None
    }

    fn name(&self) -> &str {
        "spectral"
    }
}

/// Periodic Hann window of `win_length`, centred in `n_fft`
fn hann_window(win_length: usize, n_fft: usize) -> Vec<f32> {
    let mut window = vec![0.0f32; n_fft];
    let offset = (n_fft - win_length) / 2;
    for i in 0..win_length {
        window[offset + i] = 0.5 - 0.5 * (2.0 * PI * i as f32 / win_length as f32).cos();
    }
    window
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular HTK mel filterbank, shape `(n_mels, n_fft / 2 + 1)`
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let mel_max = hz_to_mel(nyquist);

    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();
    let bin_hz: Vec<f32> = (0..n_bins)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    let mut basis = Array2::<f32>::zeros((n_mels, n_bins));
    for m in 0..n_mels {
        let (lo, centre, hi) = (edges[m], edges[m + 1], edges[m + 2]);
        for (k, &hz) in bin_hz.iter().enumerate() {
            let up = (hz - lo) / (centre - lo).max(f32::EPSILON);
            let down = (hi - hz) / (hi - centre).max(f32::EPSILON);
            basis[[m, k]] = up.min(down).max(0.0);
        }
    }
    basis
}

/// Orthonormal DCT-II basis, shape `(n_out, n_in)`
fn dct_matrix(n_out: usize, n_in: usize) -> Array2<f32> {
    Array2::from_shape_fn((n_out, n_in), |(i, m)| {
        let scale = if i == 0 {
            (1.0 / n_in as f32).sqrt()
        } else {
            (2.0 / n_in as f32).sqrt()
        };
        scale * (PI * i as f32 * (m as f32 + 0.5) / n_in as f32).cos()
    })
}

/// Iterative radix-2 Cooley-Tukey FFT; length must be a power of two
fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    if n < 2 {
        return;
    }

    // Bit-reversal permutation
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let (w_im, w_re) = angle.sin_cos();
        for start in (0..n).step_by(len) {
            let (mut cur_re, mut cur_im) = (1.0f32, 0.0f32);
            for k in 0..len / 2 {
                let a = start + k;
                let b = a + len / 2;
                let t_re = re[b] * cur_re - im[b] * cur_im;
                let t_im = re[b] * cur_im + im[b] * cur_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_params() -> SpectralParams {
        SpectralParams {
            sample_rate: 8_000,
            n_fft: 256,
            win_length: 256,
            hop_length: 128,
            n_mels: 20,
            n_mfcc: 13,
        }
    }

    #[test]
    fn test_fft_matches_dft_peak() {
        let n = 64;
        let mut re: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 4.0 * i as f32 / n as f32).cos())
            .collect();
        let mut im = vec![0.0; n];

        fft_in_place(&mut re, &mut im);

        let mags: Vec<f32> = re.iter().zip(&im).map(|(r, i)| (r * r + i * i).sqrt()).collect();
        assert_relative_eq!(mags[4], n as f32 / 2.0, epsilon = 1e-3);
        assert!(mags[3] < 1e-3);
    }

    #[test]
    fn test_mfcc_shape() {
        let extractor = MfccExtractor::new(small_params()).unwrap();
        let signal: Vec<f32> = (0..2_000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 8_000.0).sin())
            .collect();

        let mfcc = extractor.mfcc(&signal);

        // 2000 + 256 padding, hop 128
        assert_eq!(mfcc.ncols(), 13);
        assert_eq!(mfcc.nrows(), 1 + (2_000 + 256 - 256) / 128);
        assert!(mfcc.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_filterbank_rows_nonempty() {
        let basis = mel_filterbank(8_000, 256, 20);
        for row in basis.rows() {
            assert!(row.sum() > 0.0);
        }
    }

    #[test]
    fn test_dct_is_orthonormal() {
        let d = dct_matrix(8, 8);
        let eye = d.dot(&d.t());
        for i in 0..8 {
            for j in 0..8 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(eye[[i, j]], expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_params_check() {
        let mut params = small_params();
        params.n_fft = 300;
        assert!(params.check().is_err());

        let mut params = small_params();
        params.n_mfcc = 30;
        assert!(params.check().is_err());

        assert!(small_params().check().is_ok());
    }
}
