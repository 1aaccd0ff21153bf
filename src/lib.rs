//! echo-infer -- edge inference with accelerator-first backend resolution.
//!
//! This crate picks an inference runtime for the host (BrainChip Akida on
//! Linux ARM, tract ONNX/TFLite on the CPU, a placeholder when nothing
//! loads) and turns image and audio files into the fixed-shape tensors
//! those runtimes expect.

pub mod backend;
pub mod config;
pub mod deploy;
pub mod error;
pub mod platform;
pub mod preprocess;
pub mod selftest;
pub mod tensor;

pub use backend::{BackendKind, BackendResolver, ModelHandle, Resolution, ResolveRequest};
pub use config::EchoConfig;
pub use error::{EchoError, Result};
pub use tensor::Tensor;
