//! Audio files to `(1, samples)` mono tensors at a fixed sample rate.

use std::path::Path;

use tracing::debug;

use crate::config::AudioConfig;
use crate::error::{EchoError, Result};
use crate::preprocess::{normalize_peak, select, Decoder};
use crate::tensor::Tensor;

/// Upper bound on a padded signal, one hour at 48 kHz.
const MAX_SAMPLES: usize = 3600 * 48_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioOptions {
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// Exact length in seconds; the decoded signal is truncated or
    /// zero-padded to `round(duration * sample_rate)` samples.
    pub duration: Option<f32>,
    /// Peak-normalize to `[-1, 1]`.
    pub normalize: bool,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            duration: None,
            normalize: true,
        }
    }
}

impl From<&AudioConfig> for AudioOptions {
    fn from(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            duration: None,
            normalize: config.normalize,
        }
    }
}

/// Decodes a file to mono `f32` samples at the requested rate.
pub trait AudioDecoder: Decoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>>;
}

/// Audio decoders in preference order.
pub fn default_audio_decoders() -> Vec<Box<dyn AudioDecoder>> {
    let mut decoders: Vec<Box<dyn AudioDecoder>> = Vec::new();
    #[cfg(feature = "audio")]
    decoders.push(Box::new(SymphoniaDecoder));
    decoders.push(Box::new(HoundDecoder));
    decoders
}

pub fn preprocess_audio(path: &Path, options: &AudioOptions) -> Result<Tensor> {
    preprocess_audio_with(&default_audio_decoders(), path, options)
}

pub fn preprocess_audio_with(
    decoders: &[Box<dyn AudioDecoder>],
    path: &Path,
    options: &AudioOptions,
) -> Result<Tensor> {
    if options.sample_rate == 0 {
        return Err(EchoError::InvalidShapeOrDuration(
            "sample rate must be positive".to_string(),
        ));
    }
    let target_len = match options.duration {
        Some(d) if !d.is_finite() || d <= 0.0 => {
            return Err(EchoError::InvalidShapeOrDuration(format!(
                "duration must be a positive number of seconds, got {d}"
            )));
        }
        Some(d) => {
            let samples = (d as f64 * options.sample_rate as f64).round();
            if samples > MAX_SAMPLES as f64 {
                return Err(EchoError::InvalidShapeOrDuration(format!(
                    "duration {d}s at {} Hz exceeds {MAX_SAMPLES} samples",
                    options.sample_rate
                )));
            }
            Some(samples as usize)
        }
        None => None,
    };

    let decoder = select(decoders, path)?;
    let mut samples = decoder.decode(path, options.sample_rate)?;
    debug!(
        path = %path.display(),
        decoder = decoder.name(),
        samples = samples.len(),
        "Audio decoded"
    );

    if let Some(len) = target_len {
        samples.resize(len, 0.0);
    }
    if options.normalize {
        normalize_peak(&mut samples);
    }

    let len = samples.len();
    Tensor::from_shape_vec(&[1, len], samples)
}

/// Average interleaved frames down to one channel.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling. Output length is `round(n * to / from)`.
fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let step = from as f64 / to as f64;
    let out_len = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = (pos - i0 as f64) as f32;
            samples[i0] * (1.0 - frac) + samples[i1] * frac
        })
        .collect()
}

// ---------------------------------------------------------------------------
// hound (WAV only)
// ---------------------------------------------------------------------------

/// WAV reader with linear resampling. Always built.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoundDecoder;

impl Decoder for HoundDecoder {
    fn name(&self) -> &'static str {
        "hound"
    }

    fn is_available(&self) -> bool {
        true
    }
}

impl AudioDecoder for HoundDecoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>> {
        let bad = |e: hound::Error| EchoError::unsupported_format(path, e);

        let mut reader = hound::WavReader::open(path).map_err(bad)?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(bad)?,
            hound::SampleFormat::Int => {
                let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(bad)?
            }
        };

        let mono = downmix(&interleaved, spec.channels as usize);
        Ok(resample_linear(&mono, spec.sample_rate, sample_rate))
    }
}

// ---------------------------------------------------------------------------
// symphonia + rubato
// ---------------------------------------------------------------------------

/// Multi-format decoder (WAV, FLAC, OGG/Vorbis, MP3) with sinc resampling.
#[cfg(feature = "audio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

#[cfg(feature = "audio")]
impl Decoder for SymphoniaDecoder {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(feature = "audio")]
impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>> {
        let (mono, source_rate) = symphonia_decode(path)?;
        resample_sinc(mono, source_rate, sample_rate)
            .map_err(|e| EchoError::unsupported_format(path, format!("resampling failed: {e}")))
    }
}

#[cfg(feature = "audio")]
fn symphonia_decode(path: &Path) -> Result<(Vec<f32>, u32)> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let bad = |e: SymphoniaError| EchoError::unsupported_format(path, e);

    let file = std::fs::File::open(path).map_err(|e| EchoError::unsupported_format(path, e))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(bad)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EchoError::unsupported_format(path, "no audio track"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let source_rate = params
        .sample_rate
        .ok_or_else(|| EchoError::unsupported_format(path, "unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(bad)?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(bad(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count();
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                mono.extend(downmix(buffer.samples(), channels));
            }
            // Corrupt packet: skip it and keep going.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(bad(e)),
        }
    }

    Ok((mono, source_rate))
}

#[cfg(feature = "audio")]
fn resample_sinc(
    samples: Vec<f32>,
    from: u32,
    to: u32,
) -> std::result::Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    const CHUNK: usize = 1024;

    if from == to || samples.is_empty() {
        return Ok(samples);
    }

    let ratio = to as f64 / from as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK, 1)?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay);

    let mut chunks = samples.chunks_exact(CHUNK);
    for chunk in &mut chunks {
        let frames = resampler.process(&[chunk][..], None)?;
        out.extend_from_slice(&frames[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let frames = resampler.process_partial(Some(&[rest][..]), None)?;
        out.extend_from_slice(&frames[0]);
    }
    // Flush the filter tail until the delayed signal is complete.
    while out.len() < expected + delay {
        let frames = resampler.process_partial::<&[f32]>(None, None)?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp {
        len: usize,
    }

    impl Decoder for Ramp {
        fn name(&self) -> &'static str {
            "ramp"
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    impl AudioDecoder for Ramp {
        fn decode(&self, _path: &Path, _sample_rate: u32) -> Result<Vec<f32>> {
            Ok((0..self.len).map(|i| i as f32 * 0.5).collect())
        }
    }

    fn ramp(len: usize) -> Vec<Box<dyn AudioDecoder>> {
        vec![Box::new(Ramp { len })]
    }

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for c in 0..channels {
                let v: i16 = if c == 0 { 16384 } else { -16384 };
                let sample = if i % 2 == 0 { v } else { v / 2 };
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_duration_pads_and_truncates() {
        let options = AudioOptions {
            sample_rate: 10,
            duration: Some(0.5),
            normalize: false,
        };
        let padded = preprocess_audio_with(&ramp(3), Path::new("a.wav"), &options).unwrap();
        assert_eq!(padded.shape(), &[1, 5]);
        assert_eq!(padded.as_slice(), &[0.0, 0.5, 1.0, 0.0, 0.0]);

        let truncated = preprocess_audio_with(&ramp(9), Path::new("a.wav"), &options).unwrap();
        assert_eq!(truncated.shape(), &[1, 5]);
    }

    #[test]
    fn test_normalize_peak_to_one() {
        let options = AudioOptions {
            sample_rate: 10,
            ..AudioOptions::default()
        };
        let tensor = preprocess_audio_with(&ramp(5), Path::new("a.wav"), &options).unwrap();
        assert_eq!(tensor.max_abs(), 1.0);
    }

    #[test]
    fn test_invalid_options_rejected() {
        for options in [
            AudioOptions {
                sample_rate: 0,
                ..AudioOptions::default()
            },
            AudioOptions {
                duration: Some(0.0),
                ..AudioOptions::default()
            },
            AudioOptions {
                duration: Some(f32::NAN),
                ..AudioOptions::default()
            },
        ] {
            let err = preprocess_audio_with(&ramp(1), Path::new("a.wav"), &options).unwrap_err();
            assert!(matches!(err, EchoError::InvalidShapeOrDuration(_)));
        }
    }

    #[test]
    fn test_oversized_duration_rejected_before_allocating() {
        for duration in [1e20, 36_000.0] {
            let options = AudioOptions {
                duration: Some(duration),
                ..AudioOptions::default()
            };
            let err = preprocess_audio_with(&ramp(1), Path::new("a.wav"), &options).unwrap_err();
            assert!(matches!(err, EchoError::InvalidShapeOrDuration(_)));
        }
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 3.0, -1.0, 1.0], 2), vec![2.0, 0.0]);
        assert_eq!(downmix(&[0.25, 0.5], 1), vec![0.25, 0.5]);
    }

    #[test]
    fn test_resample_linear_length() {
        let input: Vec<f32> = (0..441).map(|i| i as f32).collect();
        let out = resample_linear(&input, 44_100, 16_000);
        assert_eq!(out.len(), 160);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 2.75625).abs() < 1e-4);
    }

    #[test]
    fn test_hound_decoder_stereo_to_mono() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 8000, 2, 100);

        let samples = HoundDecoder.decode(&path, 8000).unwrap();
        assert_eq!(samples.len(), 100);
        // Opposite channels cancel out.
        assert!(samples.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_hound_decoder_scales_int_pcm() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 8000, 1, 4);

        let samples = HoundDecoder.decode(&path, 8000).unwrap();
        assert_eq!(samples, vec![0.5, 0.25, 0.5, 0.25]);
    }

    #[test]
    fn test_hound_decoder_rejects_non_wav() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();

        let err = HoundDecoder.decode(&path, 16_000).unwrap_err();
        assert!(matches!(err, EchoError::UnsupportedFormat { .. }));
    }

    #[cfg(feature = "audio")]
    #[test]
    fn test_symphonia_decoder_resamples() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 44_100, 1, 44_100);

        let samples = SymphoniaDecoder.decode(&path, 16_000).unwrap();
        assert_eq!(samples.len(), 16_000);
    }
}
