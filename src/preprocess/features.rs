//! Time-frequency features computed from a preprocessed audio tensor.
//!
//! Input is `(1, n)` or `(n,)`; only the first row is used. The STFT is
//! centered (zero padding of `n_fft / 2` on each side) with a periodic Hann
//! window, so a signal of `n` samples yields `1 + n / hop_length` frames.

use crate::config::AudioConfig;
use crate::error::{EchoError, Result};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrogramOptions {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Project onto this many mel bands; linear magnitudes when `None`.
    pub n_mels: Option<usize>,
    pub sample_rate: u32,
    /// Upper edge of the mel filterbank in Hz, capped at Nyquist.
    pub fmax: f32,
}

impl Default for SpectrogramOptions {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: None,
            sample_rate: 16_000,
            fmax: 8000.0,
        }
    }
}

impl From<&AudioConfig> for SpectrogramOptions {
    fn from(config: &AudioConfig) -> Self {
        Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            n_mels: config.n_mels,
            sample_rate: config.sample_rate,
            fmax: config.fmax,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfccOptions {
    pub n_mfcc: usize,
    pub sample_rate: u32,
}

impl Default for MfccOptions {
    fn default() -> Self {
        Self {
            n_mfcc: 13,
            sample_rate: 16_000,
        }
    }
}

impl From<&AudioConfig> for MfccOptions {
    fn from(config: &AudioConfig) -> Self {
        Self {
            n_mfcc: config.n_mfcc,
            sample_rate: config.sample_rate,
        }
    }
}

/// Magnitude (or mel) spectrogram, `(1, bins, frames)`.
pub fn audio_to_spectrogram(audio: &Tensor, options: &SpectrogramOptions) -> Result<Tensor> {
    check_positive("n_fft", options.n_fft)?;
    check_positive("hop_length", options.hop_length)?;
    if let Some(n_mels) = options.n_mels {
        check_positive("n_mels", n_mels)?;
        if !options.fmax.is_finite() || options.fmax <= 0.0 {
            return Err(EchoError::InvalidShapeOrDuration(format!(
                "fmax must be a positive frequency, got {}",
                options.fmax
            )));
        }
    }
    check_positive("sample_rate", options.sample_rate as usize)?;
    imp::spectrogram(audio, options)
}

/// Mel-frequency cepstral coefficients, `(1, n_mfcc, frames)`.
pub fn audio_to_mfcc(audio: &Tensor, options: &MfccOptions) -> Result<Tensor> {
    check_positive("n_mfcc", options.n_mfcc)?;
    check_positive("sample_rate", options.sample_rate as usize)?;
    imp::mfcc(audio, options)
}

fn check_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(EchoError::InvalidShapeOrDuration(format!(
            "{name} must be positive"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "audio"))]
mod imp {
    use super::*;

    pub(super) fn spectrogram(_audio: &Tensor, _options: &SpectrogramOptions) -> Result<Tensor> {
        Err(EchoError::MissingDependency {
            feature: "spectrogram features",
            dependency: "rustfft (build with the `audio` feature)",
        })
    }

    pub(super) fn mfcc(_audio: &Tensor, _options: &MfccOptions) -> Result<Tensor> {
        Err(EchoError::MissingDependency {
            feature: "MFCC features",
            dependency: "rustfft (build with the `audio` feature)",
        })
    }
}

#[cfg(feature = "audio")]
mod imp {
    use std::f64::consts::PI;

    use ndarray::{Array2, Axis};
    use rustfft::num_complex::Complex;
    use rustfft::FftPlanner;

    use super::*;

    const MFCC_N_FFT: usize = 2048;
    const MFCC_HOP: usize = 512;
    const MFCC_N_MELS: usize = 128;
    const AMIN: f32 = 1e-10;
    const TOP_DB: f32 = 80.0;

    pub(super) fn spectrogram(audio: &Tensor, options: &SpectrogramOptions) -> Result<Tensor> {
        let signal = audio.first_row();
        let magnitudes = stft_magnitude(&signal, options.n_fft, options.hop_length);

        let features = match options.n_mels {
            Some(n_mels) => {
                let fmax = options.fmax.min(options.sample_rate as f32 / 2.0);
                let filters =
                    mel_filterbank(options.sample_rate, options.n_fft, n_mels, fmax as f64);
                filters.dot(&magnitudes)
            }
            None => magnitudes,
        };
        Ok(Tensor::from(features.insert_axis(Axis(0)).into_dyn()))
    }

    pub(super) fn mfcc(audio: &Tensor, options: &MfccOptions) -> Result<Tensor> {
        let signal = audio.first_row();
        let power = stft_magnitude(&signal, MFCC_N_FFT, MFCC_HOP).mapv(|m| m * m);
        let filters = mel_filterbank(
            options.sample_rate,
            MFCC_N_FFT,
            MFCC_N_MELS,
            options.sample_rate as f64 / 2.0,
        );
        let db = power_to_db(filters.dot(&power));
        let coefficients = dct_ortho(MFCC_N_MELS, options.n_mfcc).dot(&db);
        Ok(Tensor::from(coefficients.insert_axis(Axis(0)).into_dyn()))
    }

    /// `|STFT|` as `(n_fft / 2 + 1, 1 + n / hop)`.
    pub(super) fn stft_magnitude(signal: &[f32], n_fft: usize, hop: usize) -> Array2<f32> {
        let bins = n_fft / 2 + 1;
        let frames = 1 + signal.len() / hop;
        let pad = n_fft / 2;
        let window: Vec<f32> = (0..n_fft)
            .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n_fft as f64).cos()) as f32)
            .collect();

        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut out = Array2::<f32>::zeros((bins, frames));

        for frame in 0..frames {
            let start = frame * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                // Index into the zero-padded signal.
                let sample = (start + i)
                    .checked_sub(pad)
                    .and_then(|j| signal.get(j))
                    .copied()
                    .unwrap_or(0.0);
                *slot = Complex::new(sample * window[i], 0.0);
            }
            fft.process(&mut buffer);
            for (bin, value) in buffer.iter().take(bins).enumerate() {
                out[[bin, frame]] = value.norm();
            }
        }
        out
    }

    fn hz_to_mel(hz: f64) -> f64 {
        const F_SP: f64 = 200.0 / 3.0;
        const MIN_LOG_HZ: f64 = 1000.0;
        const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
        let logstep = 6.4f64.ln() / 27.0;
        if hz >= MIN_LOG_HZ {
            MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep
        } else {
            hz / F_SP
        }
    }

    fn mel_to_hz(mel: f64) -> f64 {
        const F_SP: f64 = 200.0 / 3.0;
        const MIN_LOG_HZ: f64 = 1000.0;
        const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
        let logstep = 6.4f64.ln() / 27.0;
        if mel >= MIN_LOG_MEL {
            MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
        } else {
            F_SP * mel
        }
    }

    /// Slaney-style triangular filters, area-normalized, `(n_mels, n_fft / 2 + 1)`.
    pub(super) fn mel_filterbank(
        sample_rate: u32,
        n_fft: usize,
        n_mels: usize,
        fmax: f64,
    ) -> Array2<f32> {
        let bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..bins)
            .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
            .collect();

        let mel_min = hz_to_mel(0.0);
        let mel_max = hz_to_mel(fmax);
        let mel_f: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64)
            .map(mel_to_hz)
            .collect();

        let mut weights = Array2::<f32>::zeros((n_mels, bins));
        for m in 0..n_mels {
            let (lo, center, hi) = (mel_f[m], mel_f[m + 1], mel_f[m + 2]);
            let enorm = 2.0 / (hi - lo);
            for (k, &freq) in fft_freqs.iter().enumerate() {
                let lower = (freq - lo) / (center - lo);
                let upper = (hi - freq) / (hi - center);
                let w = lower.min(upper).max(0.0);
                weights[[m, k]] = (w * enorm) as f32;
            }
        }
        weights
    }

    /// `10 log10(max(amin, S))`, clipped to `max - top_db`.
    fn power_to_db(power: Array2<f32>) -> Array2<f32> {
        let db = power.mapv(|p| 10.0 * p.max(AMIN).log10());
        let peak = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - TOP_DB;
        db.mapv(|v| v.max(floor))
    }

    /// Orthonormal DCT-II basis, first `n_out` rows, `(n_out, n_in)`.
    fn dct_ortho(n_in: usize, n_out: usize) -> Array2<f32> {
        let n = n_in as f64;
        Array2::from_shape_fn((n_out, n_in), |(k, i)| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_hz_mel_roundtrip_both_regions() {
            for hz in [0.0, 440.0, 999.0, 1000.0, 4000.0, 8000.0] {
                assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
            }
            assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
        }

        #[test]
        fn test_stft_of_dc_signal() {
            let signal = vec![1.0f32; 64];
            let mags = stft_magnitude(&signal, 16, 4);
            assert_eq!(mags.dim(), (9, 17));
            // Middle frame is fully inside the signal: all energy in bin 0,
            // equal to the sum of the periodic Hann window (n_fft / 2).
            let mid = mags.column(8);
            assert!((mid[0] - 8.0).abs() < 1e-4);
            assert!(mid.iter().skip(2).all(|&v| v < 1e-4));
        }

        #[test]
        fn test_filterbank_triangles_nonnegative() {
            let fb = mel_filterbank(16_000, 512, 40, 8000.0);
            assert_eq!(fb.dim(), (40, 257));
            assert!(fb.iter().all(|&w| w >= 0.0));
            // Every band picks up at least one bin at this resolution.
            assert!(fb.rows().into_iter().all(|row| row.sum() > 0.0));
        }

        #[test]
        fn test_dct_ortho_is_orthonormal() {
            let basis = dct_ortho(8, 8);
            let identity = basis.dot(&basis.t());
            for ((i, j), v) in identity.indexed_iter() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-5);
            }
        }

        #[test]
        fn test_power_to_db_floor() {
            let power = Array2::from_shape_vec((1, 3), vec![1.0, 1e-12, 0.0]).unwrap();
            let db = power_to_db(power);
            assert_eq!(db[[0, 0]], 0.0);
            assert_eq!(db[[0, 1]], -80.0);
            assert_eq!(db[[0, 2]], -80.0);
        }
    }
}
