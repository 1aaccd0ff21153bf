//! Media preprocessing: raw files in, fixed-shape `f32` tensors out.
//!
//! Each modality keeps an ordered list of decoders. The first one whose
//! backing library or binary is usable wins; a decode failure in that
//! decoder is reported as-is and the next decoder is not tried.

pub mod audio;
pub mod features;
pub mod ffmpeg;
pub mod vision;

pub use audio::{
    default_audio_decoders, preprocess_audio, preprocess_audio_with, AudioDecoder, AudioOptions,
    HoundDecoder,
};
pub use features::{audio_to_mfcc, audio_to_spectrogram, MfccOptions, SpectrogramOptions};
pub use ffmpeg::FfmpegImageDecoder;
pub use vision::{
    default_vision_decoders, preprocess_image, preprocess_image_with, DecodedImage, ImageOptions,
    VisionDecoder,
};

#[cfg(feature = "audio")]
pub use audio::SymphoniaDecoder;
#[cfg(feature = "vision")]
pub use vision::ImageCrateDecoder;

use std::path::Path;

use tracing::debug;

use crate::error::{EchoError, Result};

/// Decoder names as reported by `check` and the debug log.
pub trait Decoder {
    fn name(&self) -> &'static str;
    fn is_available(&self) -> bool;
}

/// First decoder in `decoders` that reports itself available.
pub(crate) fn select<'a, D>(decoders: &'a [Box<D>], path: &Path) -> Result<&'a D>
where
    D: Decoder + ?Sized,
{
    let chosen = decoders
        .iter()
        .find(|d| d.is_available())
        .ok_or_else(|| {
            let tried: Vec<&str> = decoders.iter().map(|d| d.name()).collect();
            EchoError::unsupported_format(
                path,
                format!("no decoder available (tried: {})", tried.join(", ")),
            )
        })?;
    debug!(decoder = chosen.name(), path = %path.display(), "Decoder selected");
    Ok(chosen.as_ref())
}

/// Scale `samples` so the peak magnitude is 1. Silent input is left alone.
pub(crate) fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if peak > 0.0 && peak.is_finite() {
        for v in samples.iter_mut() {
            *v /= peak;
        }
    }
}
