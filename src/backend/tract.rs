//! CPU runtimes on top of tract.
//!
//! Both the ONNX session and the TFLite interpreter end up as an optimized
//! typed plan; they differ only in how the graph is parsed.

use std::path::Path;

use tract_core::prelude::{
    Framework, IntoTValue, Tensor as TractTensor, TractResult, TypedModel, TypedRunnableModel,
};
use tracing::debug;

use crate::tensor::Tensor;

/// An optimized, runnable graph plus the name of its first declared input.
pub(crate) struct TractPlan {
    plan: TypedRunnableModel<TypedModel>,
    input_name: String,
}

impl TractPlan {
    fn from_typed(model: TypedModel) -> TractResult<Self> {
        let input_name = model
            .input_outlets()?
            .first()
            .map(|outlet| model.node(outlet.node).name.clone())
            .unwrap_or_default();
        let plan = model.into_optimized()?.into_runnable()?;
        Ok(Self { plan, input_name })
    }

    pub(crate) fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Bind `input` to the first input, evaluate once, and return the first
    /// output as `f32` (empty when the graph declares no output).
    pub(crate) fn run(&self, input: &Tensor) -> TractResult<Tensor> {
        let bound = TractTensor::from_shape::<f32>(input.shape(), input.as_slice())?;
        let outputs = self.plan.run(vec![bound.into_tvalue()].into())?;
        let Some(first) = outputs.first() else {
            return Ok(Tensor::empty());
        };
        let first = first.cast_to::<f32>()?;
        let values = first.as_slice::<f32>()?.to_vec();
        Ok(Tensor::from_shape_vec(first.shape(), values)?)
    }
}

/// Parse and optimize an ONNX graph.
#[cfg(feature = "onnx")]
pub(crate) fn load_onnx(path: &Path) -> TractResult<TractPlan> {
    use tract_onnx::prelude::InferenceModelExt;

    let model = tract_onnx::onnx().model_for_path(path)?.into_typed()?;
    let plan = TractPlan::from_typed(model)?;
    debug!(path = %path.display(), input = plan.input_name(), "ONNX session ready");
    Ok(plan)
}

/// Parse a TFLite flatbuffer and allocate its tensors.
#[cfg(feature = "tflite")]
pub(crate) fn load_tflite(path: &Path) -> TractResult<TractPlan> {
    let model = tract_tflite::tflite().model_for_path(path)?;
    let plan = TractPlan::from_typed(model)?;
    debug!(path = %path.display(), input = plan.input_name(), "TFLite interpreter ready");
    Ok(plan)
}
