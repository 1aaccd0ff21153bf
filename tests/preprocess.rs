//! Preprocessing scenarios on fixture files written into temp directories.

use std::path::{Path, PathBuf};

use echo_infer::preprocess::{
    audio_to_mfcc, audio_to_spectrogram, preprocess_audio, preprocess_audio_with, AudioDecoder,
    AudioOptions, HoundDecoder, MfccOptions, SpectrogramOptions,
};
use echo_infer::EchoError;
use proptest::prelude::*;
use tempfile::TempDir;

fn write_tone(path: &Path, sample_rate: u32, channels: u16, seconds: f32, amplitude: f32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (seconds * sample_rate as f32) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * amplitude;
        for _ in 0..channels {
            writer.write_sample(sample as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
}

fn tone_fixture(dir: &TempDir, name: &str, sample_rate: u32, seconds: f32) -> PathBuf {
    let path = dir.path().join(name);
    write_tone(&path, sample_rate, 2, seconds, 12_000.0);
    path
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

#[test]
fn test_three_second_wav_trimmed_to_two_seconds() {
    let dir = TempDir::new().unwrap();
    let wav = tone_fixture(&dir, "speech.wav", 44_100, 3.0);
    let options = AudioOptions {
        sample_rate: 16_000,
        duration: Some(2.0),
        normalize: true,
    };

    let tensor = preprocess_audio(&wav, &options).unwrap();
    assert_eq!(tensor.shape(), &[1, 32_000]);
    assert!(tensor.max_abs() <= 1.0);
    assert!(tensor.as_slice().iter().all(|v| v.is_finite()));
}

#[test]
fn test_hound_fallback_matches_shape_contract() {
    let dir = TempDir::new().unwrap();
    let wav = tone_fixture(&dir, "speech.wav", 44_100, 1.0);
    let decoders: Vec<Box<dyn AudioDecoder>> = vec![Box::new(HoundDecoder)];

    let tensor = preprocess_audio_with(
        &decoders,
        &wav,
        &AudioOptions {
            duration: Some(1.5),
            ..AudioOptions::default()
        },
    )
    .unwrap();
    assert_eq!(tensor.shape(), &[1, 24_000]);
    // Zero padding after the one second of signal.
    assert!(tensor.as_slice()[16_100..].iter().all(|&v| v == 0.0));
}

#[test]
fn test_silent_audio_stays_finite() {
    let dir = TempDir::new().unwrap();
    let wav = dir.path().join("silence.wav");
    write_tone(&wav, 16_000, 1, 0.5, 0.0);

    let tensor = preprocess_audio(&wav, &AudioOptions::default()).unwrap();
    assert_eq!(tensor.shape(), &[1, 8_000]);
    assert!(tensor.as_slice().iter().all(|&v| v == 0.0));
}

#[test]
fn test_garbage_audio_is_unsupported_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("noise.wav");
    std::fs::write(&path, vec![0x5a; 512]).unwrap();

    let err = preprocess_audio(&path, &AudioOptions::default()).unwrap_err();
    assert!(matches!(err, EchoError::UnsupportedFormat { .. }));
}

#[test]
fn test_feature_extractors_on_preprocessed_audio() {
    let dir = TempDir::new().unwrap();
    let wav = tone_fixture(&dir, "speech.wav", 16_000, 1.0);
    let audio = preprocess_audio(&wav, &AudioOptions::default()).unwrap();

    let spec = audio_to_spectrogram(
        &audio,
        &SpectrogramOptions {
            n_mels: Some(40),
            ..SpectrogramOptions::default()
        },
    );
    let mfcc = audio_to_mfcc(&audio, &MfccOptions::default());

    if cfg!(feature = "audio") {
        assert_eq!(spec.unwrap().shape(), &[1, 40, 32]);
        assert_eq!(mfcc.unwrap().shape(), &[1, 13, 32]);
    } else {
        assert!(matches!(spec, Err(EchoError::MissingDependency { .. })));
        assert!(matches!(mfcc, Err(EchoError::MissingDependency { .. })));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_audio_length_is_rounded_duration(
        duration in 0.01f32..2.5,
        sample_rate in prop::sample::select(vec![8_000u32, 16_000, 22_050]),
    ) {
        let dir = TempDir::new().unwrap();
        let wav = tone_fixture(&dir, "tone.wav", 16_000, 1.0);
        let options = AudioOptions { sample_rate, duration: Some(duration), normalize: true };

        let tensor = preprocess_audio(&wav, &options).unwrap();
        let expected = (duration as f64 * sample_rate as f64).round() as usize;
        prop_assert_eq!(tensor.shape(), &[1, expected][..]);
        prop_assert!(tensor.max_abs() <= 1.0);
        prop_assert!(tensor.as_slice().iter().all(|v| v.is_finite()));
    }
}

// ---------------------------------------------------------------------------
// Vision
// ---------------------------------------------------------------------------

#[cfg(feature = "vision")]
mod vision {
    use super::*;
    use echo_infer::preprocess::{preprocess_image, ImageOptions};

    fn gradient_png(dir: &TempDir, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(format!("gradient_{width}x{height}.png"));
        image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn test_512_square_to_default_224() {
        let dir = TempDir::new().unwrap();
        let png = gradient_png(&dir, 512, 512);

        let tensor = preprocess_image(&png, &ImageOptions::default()).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor
            .as_slice()
            .iter()
            .all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_aspect_ratio_not_preserved() {
        let dir = TempDir::new().unwrap();
        let png = gradient_png(&dir, 300, 100);
        let options = ImageOptions {
            target_shape: (50, 50),
            ..ImageOptions::default()
        };

        let tensor = preprocess_image(&png, &options).unwrap();
        assert_eq!(tensor.shape(), &[1, 50, 50, 3]);
    }

    #[test]
    fn test_unnormalized_keeps_byte_range() {
        let dir = TempDir::new().unwrap();
        let png = gradient_png(&dir, 64, 64);
        let options = ImageOptions {
            target_shape: (32, 32),
            grayscale: true,
            normalize: false,
        };

        let tensor = preprocess_image(&png, &options).unwrap();
        assert_eq!(tensor.shape(), &[1, 1, 32, 32]);
        assert!(tensor.summary().max > 1.0);
        assert!(tensor.summary().max <= 255.0);
    }

    #[test]
    fn test_not_an_image_is_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"plain text").unwrap();

        let err = preprocess_image(&path, &ImageOptions::default()).unwrap_err();
        assert!(matches!(err, EchoError::UnsupportedFormat { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_image_shape_matches_target(
            height in 1u32..96,
            width in 1u32..96,
            grayscale in any::<bool>(),
        ) {
            let dir = TempDir::new().unwrap();
            let png = gradient_png(&dir, 40, 30);
            let options = ImageOptions {
                target_shape: (height, width),
                grayscale,
                normalize: true,
            };

            let tensor = preprocess_image(&png, &options).unwrap();
            let (h, w) = (height as usize, width as usize);
            let expected: Vec<usize> = if grayscale { vec![1, 1, h, w] } else { vec![1, h, w, 3] };
            prop_assert_eq!(tensor.shape(), &expected[..]);
            prop_assert!(tensor.max_abs() <= 1.0);
        }
    }
}
