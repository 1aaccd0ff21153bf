//! Inference backends -- BrainChip accelerator first, tract CPU runtimes as
//! fallback, and a placeholder so pipelines always have something to call.

pub mod accelerator;
pub mod availability;
pub mod dummy;
pub mod handle;
pub mod resolver;

#[cfg(any(feature = "onnx", feature = "tflite"))]
mod tract;

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EchoError;

pub use accelerator::{AcceleratorDevice, AcceleratorModel, AcceleratorSdk, KernelDriverSdk};
pub use availability::{BackendAvailability, FixedAvailability, SystemAvailability};
pub use handle::ModelHandle;
pub use resolver::{
    BackendResolver, Candidate, CandidateFailure, CandidateList, Resolution, ResolutionState,
    ResolveRequest,
};

/// Extensions of compiled accelerator programs.
pub const ACCELERATOR_EXTENSIONS: [&str; 2] = ["fbz", "ez"];
pub const ONNX_EXTENSIONS: [&str; 1] = ["onnx"];
/// Mobile-graph (TensorFlow Lite flatbuffer) extensions.
pub const TFLITE_EXTENSIONS: [&str; 2] = ["tflite", "lite"];

/// Inference runtime kinds. Closed set: anything else is `UnsupportedBackend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// BrainChip Akida neuromorphic processor (Linux ARM hosts only)
    #[serde(alias = "akida")]
    Accelerator,
    /// ONNX graph on the CPU
    Onnx,
    /// TensorFlow Lite flatbuffer on the CPU
    Tflite,
    /// Placeholder returning random output of a fixed shape
    Dummy,
}

impl BackendKind {
    /// CPU runtimes in preference order.
    pub const CPU_PREFERENCE: [BackendKind; 2] = [BackendKind::Onnx, BackendKind::Tflite];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Accelerator => "accelerator",
            BackendKind::Onnx => "onnx",
            BackendKind::Tflite => "tflite",
            BackendKind::Dummy => "dummy",
        }
    }

    /// Model file extensions handled by this kind (empty for `Dummy`).
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            BackendKind::Accelerator => &ACCELERATOR_EXTENSIONS,
            BackendKind::Onnx => &ONNX_EXTENSIONS,
            BackendKind::Tflite => &TFLITE_EXTENSIONS,
            BackendKind::Dummy => &[],
        }
    }

    /// Pick the backend from a model file's extension (case-insensitive).
    pub fn from_extension(path: &Path) -> Option<BackendKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        [BackendKind::Accelerator, BackendKind::Onnx, BackendKind::Tflite]
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EchoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accelerator" | "akida" => Ok(BackendKind::Accelerator),
            "onnx" => Ok(BackendKind::Onnx),
            "tflite" | "lite" => Ok(BackendKind::Tflite),
            "dummy" => Ok(BackendKind::Dummy),
            other => Err(EchoError::UnsupportedBackend(other.to_string())),
        }
    }
}
