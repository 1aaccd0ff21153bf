//! Error kinds shared by preprocessing and backend resolution.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendKind;

/// Result alias used throughout the library.
pub type Result<T, E = EchoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EchoError {
    /// Decoding failed or no decoder is usable for the file.
    #[error("unsupported format for {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// A feature whose library has no fallback was not compiled in.
    #[error("{feature} requires {dependency}, which is not available in this build")]
    MissingDependency {
        feature: &'static str,
        dependency: &'static str,
    },

    /// A candidate backend failed while constructing its runtime object.
    #[error("failed to load {kind} model from {}: {reason}", path.display())]
    ModelLoadFailure {
        kind: BackendKind,
        path: PathBuf,
        reason: String,
    },

    /// An explicit backend was requested but no model file could be found for it.
    #[error("no {kind} model found in the configured search locations")]
    NoModelFound { kind: BackendKind },

    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("invalid shape or duration: {0}")]
    InvalidShapeOrDuration(String),

    /// The runtime rejected the input or failed while evaluating.
    #[error("inference failed on {kind} backend: {reason}")]
    InferenceFailure { kind: BackendKind, reason: String },

    #[error("invalid deployment manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EchoError {
    pub(crate) fn unsupported_format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnsupportedFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn load_failure(
        kind: BackendKind,
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        Self::ModelLoadFailure {
            kind,
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
