//! Uniform `predict` over whichever runtime the resolver loaded.

use std::path::{Path, PathBuf};

use crate::backend::accelerator::AcceleratorModel;
use crate::backend::dummy::DummyModel;
use crate::backend::BackendKind;
#[cfg(any(feature = "onnx", feature = "tflite"))]
use crate::error::EchoError;
use crate::error::Result;
use crate::tensor::Tensor;

#[cfg(any(feature = "onnx", feature = "tflite"))]
use crate::backend::tract::TractPlan;

/// The runtime object owned by a handle. The handle's kind is derived from
/// the variant, so the two cannot drift apart.
enum Runtime {
    Accelerator(Box<dyn AcceleratorModel>),
    #[cfg(feature = "onnx")]
    Onnx(TractPlan),
    #[cfg(feature = "tflite")]
    Tflite(TractPlan),
    Dummy(DummyModel),
}

/// A loaded model. Built only by [`BackendResolver`](crate::backend::BackendResolver).
///
/// `predict` takes `&mut self`: one handle serves one caller at a time.
pub struct ModelHandle {
    runtime: Runtime,
    source: Option<PathBuf>,
}

impl ModelHandle {
    pub(crate) fn accelerator(model: Box<dyn AcceleratorModel>, source: &Path) -> Self {
        Self {
            runtime: Runtime::Accelerator(model),
            source: Some(source.to_path_buf()),
        }
    }

    #[cfg(feature = "onnx")]
    pub(crate) fn onnx(plan: TractPlan, source: &Path) -> Self {
        Self {
            runtime: Runtime::Onnx(plan),
            source: Some(source.to_path_buf()),
        }
    }

    #[cfg(feature = "tflite")]
    pub(crate) fn tflite(plan: TractPlan, source: &Path) -> Self {
        Self {
            runtime: Runtime::Tflite(plan),
            source: Some(source.to_path_buf()),
        }
    }

    pub(crate) fn dummy(output_len: usize) -> Self {
        Self {
            runtime: Runtime::Dummy(DummyModel::new(output_len)),
            source: None,
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self.runtime {
            Runtime::Accelerator(_) => BackendKind::Accelerator,
            #[cfg(feature = "onnx")]
            Runtime::Onnx(_) => BackendKind::Onnx,
            #[cfg(feature = "tflite")]
            Runtime::Tflite(_) => BackendKind::Tflite,
            Runtime::Dummy(_) => BackendKind::Dummy,
        }
    }

    /// Model file the runtime was built from; `None` for the placeholder.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.runtime, Runtime::Dummy(_))
    }

    pub fn predict(&mut self, input: &Tensor) -> Result<Tensor> {
        match &mut self.runtime {
            Runtime::Accelerator(model) => model.predict(input),
            #[cfg(feature = "onnx")]
            Runtime::Onnx(plan) => plan.run(input).map_err(|e| EchoError::InferenceFailure {
                kind: BackendKind::Onnx,
                reason: format!("{e:#}"),
            }),
            #[cfg(feature = "tflite")]
            Runtime::Tflite(plan) => plan.run(input).map_err(|e| EchoError::InferenceFailure {
                kind: BackendKind::Tflite,
                reason: format!("{e:#}"),
            }),
            Runtime::Dummy(model) => Ok(model.predict(input)),
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("kind", &self.kind())
            .field("source", &self.source)
            .finish()
    }
}
