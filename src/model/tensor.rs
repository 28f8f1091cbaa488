//! Dense tensor storage for weights and activations

use serde::{Deserialize, Serialize};

/// A dense row-major f32 tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Row-major values
    pub data: Vec<f32>,
    /// Shape; weights are `[out_features, in_features]`
    pub shape: Vec<usize>,
}

impl TensorData {
    /// Create a tensor, checking that the shape matches the data length.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not equal the product of `shape`.
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected: usize = shape.iter().product();
        assert_eq!(data.len(), expected, "shape {shape:?} does not match {} values", data.len());
        Self { data, shape }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of rows (output channels) for a 2-D weight.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of columns (input channels) for a 2-D weight.
    pub fn cols(&self) -> usize {
        if self.shape.len() >= 2 {
            self.shape[1..].iter().product()
        } else {
            self.shape.first().copied().unwrap_or(0)
        }
    }

    /// Fraction of exactly-zero elements.
    pub fn sparsity(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let zeros = self.data.iter().filter(|&&v| v == 0.0).count();
        zeros as f32 / self.data.len() as f32
    }
}
