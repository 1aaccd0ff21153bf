//! Image decoding through the system `ffmpeg` binary.
//!
//! Used when the in-process decoder is not compiled in. ffmpeg decodes the
//! first frame, scales it with Lanczos and streams raw `bgr24` on stdout;
//! the bytes are reordered to RGB (or reduced to BT.601 luma) here.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{EchoError, Result};
use crate::preprocess::vision::{luma, DecodedImage, ImageOptions, VisionDecoder};
use crate::preprocess::Decoder;

#[derive(Debug, Clone)]
pub struct FfmpegImageDecoder {
    binary: PathBuf,
}

impl Default for FfmpegImageDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegImageDecoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, path: &Path, height: u32, width: u32) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-v")
            .arg("error")
            .arg("-nostdin")
            .arg("-i")
            .arg(path)
            .arg("-frames:v")
            .arg("1")
            .arg("-vf")
            .arg(format!("scale={width}:{height}:flags=lanczos"))
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-")
            .stdin(Stdio::null());
        cmd
    }
}

impl Decoder for FfmpegImageDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl VisionDecoder for FfmpegImageDecoder {
    fn decode(&self, path: &Path, options: &ImageOptions) -> Result<DecodedImage> {
        let (height, width) = options.target_shape;
        let output = self
            .command(path, height, width)
            .output()
            .map_err(|e| {
                EchoError::unsupported_format(path, format!("failed to run ffmpeg: {e}"))
            })?;
        if !output.status.success() {
            return Err(EchoError::unsupported_format(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let expected = height as usize * width as usize * 3;
        if output.stdout.len() != expected {
            return Err(EchoError::unsupported_format(
                path,
                format!("ffmpeg produced {} bytes, expected {expected}", output.stdout.len()),
            ));
        }
        debug!(path = %path.display(), bytes = expected, "ffmpeg frame decoded");

        let (channels, pixels) = bgr_to_pixels(&output.stdout, options.grayscale);
        Ok(DecodedImage {
            height,
            width,
            channels,
            pixels,
        })
    }
}

/// Reorder packed BGR to RGB, or collapse it to luma.
fn bgr_to_pixels(bgr: &[u8], grayscale: bool) -> (usize, Vec<u8>) {
    let pixels = bgr.chunks_exact(3);
    if grayscale {
        (1, pixels.map(|p| luma(p[2], p[1], p[0])).collect())
    } else {
        (3, pixels.flat_map(|p| [p[2], p[1], p[0]]).collect())
    }
}
