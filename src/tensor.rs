//! Dense `f32` tensors exchanged between preprocessing and inference.

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use serde::Serialize;

use crate::error::{EchoError, Result};

/// An n-dimensional `f32` array in standard (row-major) layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// Build a tensor from a shape and row-major values.
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>) -> Result<Self> {
        let data = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|e| {
            EchoError::InvalidShapeOrDuration(format!(
                "cannot build tensor of shape {shape:?}: {e}"
            ))
        })?;
        Ok(Self { data })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// A zero-element, one-dimensional tensor.
    pub fn empty() -> Self {
        Self::zeros(&[0])
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    /// Row-major values. Always contiguous because every constructor builds
    /// a standard-layout array.
    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice().unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    pub fn into_array(self) -> ArrayD<f32> {
        self.data
    }

    /// Insert a length-1 axis at `axis`.
    pub fn insert_axis(self, axis: usize) -> Self {
        let data = self.data.insert_axis(Axis(axis));
        Self {
            data: data.as_standard_layout().into_owned(),
        }
    }

    /// The leading row of a batched tensor, or the tensor itself when it is
    /// already one-dimensional.
    pub fn first_row(&self) -> Vec<f32> {
        if self.ndim() > 1 && self.shape()[0] > 0 {
            self.data.index_axis(Axis(0), 0).iter().copied().collect()
        } else {
            self.to_vec()
        }
    }

    /// Largest absolute value, 0.0 for an empty tensor.
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()))
    }

    /// Indices and values of the `k` largest entries, largest first.
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self.data.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);
        ranked
    }

    pub fn summary(&self) -> TensorSummary {
        TensorSummary {
            shape: self.shape().to_vec(),
            min: self.data.iter().copied().fold(f32::INFINITY, f32::min),
            max: self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }
}

impl From<ArrayD<f32>> for Tensor {
    fn from(data: ArrayD<f32>) -> Self {
        Self {
            data: data.as_standard_layout().into_owned(),
        }
    }
}

/// Printable description of a tensor for CLI and JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct TensorSummary {
    pub shape: Vec<usize>,
    pub min: f32,
    pub max: f32,
}
