//! TOML configuration for echo-infer.
//!
//! Layered model: compiled-in defaults, overridden by a file found through the
//! `ECHO_CONFIG` environment variable or the standard system location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EchoConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub accelerator: AcceleratorConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EchoConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded echo configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `ECHO_CONFIG` environment variable.
    /// 2. `/etc/echo/echo.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("ECHO_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "ECHO_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/echo/echo.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Model search
// ---------------------------------------------------------------------------

/// Well-known locations the resolver searches when no model path is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Compiled accelerator programs, tried in order.
    pub accelerator_models: Vec<PathBuf>,
    /// Directories scanned for `.onnx` / `.tflite` files, in order.
    pub model_dirs: Vec<PathBuf>,
    /// Deployment manifest maintained by `echo-infer deploy`.
    pub manifest: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            accelerator_models: vec![
                PathBuf::from("./build/demo_model.ez"),
                PathBuf::from("./runtime/models/demo_model.ez"),
                PathBuf::from("../build/demo_model.ez"),
            ],
            model_dirs: vec![
                PathBuf::from("./build"),
                PathBuf::from("./runtime/models"),
                PathBuf::from("../build"),
                PathBuf::from("../runtime/models"),
            ],
            manifest: PathBuf::from("./runtime/manifest.json"),
        }
    }
}

// ---------------------------------------------------------------------------
// Accelerator
// ---------------------------------------------------------------------------

/// Kernel driver device nodes for the accelerator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceleratorConfig {
    pub device_dir: PathBuf,
    /// File name prefix of device nodes (`akida0`, `akida1`, ...).
    pub device_prefix: String,
    /// Upper bound on `f32` values read back per inference.
    pub output_len: usize,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev"),
            device_prefix: "akida".to_string(),
            output_len: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Length of the placeholder output when no backend could be loaded.
    pub dummy_output_len: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { dummy_output_len: 10 }
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub height: u32,
    pub width: u32,
    pub grayscale: bool,
    pub normalize: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            grayscale: false,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub normalize: bool,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Mel bands for spectrogram features; linear spectrogram when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_mels: Option<usize>,
    /// Upper frequency bound of the mel spectrogram (Hz).
    pub fmax: f32,
    pub n_mfcc: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            normalize: true,
            n_fft: 2048,
            hop_length: 512,
            n_mels: None,
            fmax: 8000.0,
            n_mfcc: 13,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
