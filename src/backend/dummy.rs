//! Placeholder model used when resolution is exhausted.

use rand::Rng;

use crate::tensor::Tensor;

/// Returns `output_len` uniform random values in `[0, 1)` for any input.
#[derive(Debug, Clone)]
pub struct DummyModel {
    output_len: usize,
}

impl DummyModel {
    pub fn new(output_len: usize) -> Self {
        Self { output_len }
    }

    pub fn output_len(&self) -> usize {
        self.output_len
    }

    pub fn predict(&self, _input: &Tensor) -> Tensor {
        let mut rng = rand::thread_rng();
        let values: Vec<f32> = (0..self.output_len).map(|_| rng.gen::<f32>()).collect();
        Tensor::from(ndarray::Array1::from(values).into_dyn())
    }
}
