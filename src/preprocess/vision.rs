//! Image files to `(1, H, W, 3)` or `(1, 1, H, W)` tensors.

use std::path::Path;

use tracing::debug;

use crate::config::VisionConfig;
use crate::error::{EchoError, Result};
use crate::preprocess::ffmpeg::FfmpegImageDecoder;
use crate::preprocess::{select, Decoder};
use crate::tensor::Tensor;

/// Output geometry and scaling for [`preprocess_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageOptions {
    /// `(height, width)` after resizing.
    pub target_shape: (u32, u32),
    pub grayscale: bool,
    /// Divide pixel values by 255.
    pub normalize: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            target_shape: (224, 224),
            grayscale: false,
            normalize: true,
        }
    }
}

impl From<&VisionConfig> for ImageOptions {
    fn from(config: &VisionConfig) -> Self {
        Self {
            target_shape: (config.height, config.width),
            grayscale: config.grayscale,
            normalize: config.normalize,
        }
    }
}

/// Pixels already converted and resized to the requested geometry,
/// interleaved row-major with `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub height: u32,
    pub width: u32,
    pub channels: usize,
    pub pixels: Vec<u8>,
}

pub trait VisionDecoder: Decoder {
    fn decode(&self, path: &Path, options: &ImageOptions) -> Result<DecodedImage>;
}

/// Image decoders in preference order.
pub fn default_vision_decoders() -> Vec<Box<dyn VisionDecoder>> {
    let mut decoders: Vec<Box<dyn VisionDecoder>> = Vec::new();
    #[cfg(feature = "vision")]
    decoders.push(Box::new(ImageCrateDecoder));
    decoders.push(Box::new(FfmpegImageDecoder::default()));
    decoders
}

/// Load, convert, resize and scale an image with the default decoders.
pub fn preprocess_image(path: &Path, options: &ImageOptions) -> Result<Tensor> {
    preprocess_image_with(&default_vision_decoders(), path, options)
}

pub fn preprocess_image_with(
    decoders: &[Box<dyn VisionDecoder>],
    path: &Path,
    options: &ImageOptions,
) -> Result<Tensor> {
    let (height, width) = options.target_shape;
    if height == 0 || width == 0 {
        return Err(EchoError::InvalidShapeOrDuration(format!(
            "target shape must be non-zero, got {height}x{width}"
        )));
    }

    let decoder = select(decoders, path)?;
    let image = decoder.decode(path, options)?;
    let expected_channels = if options.grayscale { 1 } else { 3 };
    let expected_len = height as usize * width as usize * expected_channels;
    if image.channels != expected_channels || image.pixels.len() != expected_len {
        return Err(EchoError::unsupported_format(
            path,
            format!(
                "{} produced {} bytes with {} channel(s), expected {expected_len} with {expected_channels}",
                decoder.name(),
                image.pixels.len(),
                image.channels
            ),
        ));
    }

    let scale = if options.normalize { 255.0 } else { 1.0 };
    let values: Vec<f32> = image.pixels.iter().map(|&p| p as f32 / scale).collect();

    // NOTE: color is channels-last but grayscale is channels-first. The two
    // layouts are inconsistent; existing models consume them as-is, so keep both.
    let (h, w) = (height as usize, width as usize);
    let shape = if options.grayscale {
        [1, 1, h, w]
    } else {
        [1, h, w, 3]
    };
    debug!(path = %path.display(), ?shape, decoder = decoder.name(), "Image preprocessed");
    Tensor::from_shape_vec(&shape, values)
}

/// BT.601 luma of one RGB pixel, rounded to the nearest byte.
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

// ---------------------------------------------------------------------------
// image crate
// ---------------------------------------------------------------------------

/// In-process decoder backed by the `image` crate.
#[cfg(feature = "vision")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

#[cfg(feature = "vision")]
impl Decoder for ImageCrateDecoder {
    fn name(&self) -> &'static str {
        "image"
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(feature = "vision")]
impl VisionDecoder for ImageCrateDecoder {
    fn decode(&self, path: &Path, options: &ImageOptions) -> Result<DecodedImage> {
        use image::imageops::{self, FilterType};
        use image::GrayImage;

        let (height, width) = options.target_shape;
        let decoded = image::open(path).map_err(|e| EchoError::unsupported_format(path, e))?;
        let rgb = decoded.to_rgb8();

        let (channels, pixels) = if options.grayscale {
            let luma_pixels: Vec<u8> = rgb.pixels().map(|p| luma(p[0], p[1], p[2])).collect();
            let gray = GrayImage::from_raw(rgb.width(), rgb.height(), luma_pixels).ok_or_else(
                || EchoError::unsupported_format(path, "luminance buffer size mismatch"),
            )?;
            let resized = imageops::resize(&gray, width, height, FilterType::Lanczos3);
            (1, resized.into_raw())
        } else {
            let resized = imageops::resize(&rgb, width, height, FilterType::Lanczos3);
            (3, resized.into_raw())
        };

        Ok(DecodedImage {
            height,
            width,
            channels,
            pixels,
        })
    }
}
