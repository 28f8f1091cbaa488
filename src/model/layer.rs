//! Layer nodes: path, type tag, weight accessor

use serde::{Deserialize, Serialize};

use super::tensor::TensorData;

/// One named layer in the module graph.
///
/// Layers without a weight (normalization, activation functions) pass
/// activations through unchanged during calibration forward passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerNode {
    /// Stable module path, e.g. `model.layers.0.self_attn.q_proj`
    pub path: String,
    /// Layer type tag, e.g. `Linear`, `LayerNorm`, `Embedding`
    pub kind: String,
    /// Weight tensor, `[out_features, in_features]` for Linear layers
    pub weight: Option<TensorData>,
}

impl LayerNode {
    /// A Linear layer with the given weight.
    pub fn linear(path: impl Into<String>, weight: TensorData) -> Self {
        Self { path: path.into(), kind: "Linear".to_string(), weight: Some(weight) }
    }

    /// A weightless pass-through layer.
    pub fn passthrough(path: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { path: path.into(), kind: kind.into(), weight: None }
    }

    /// Whether this layer transforms activations with a weight matrix.
    pub fn is_weighted(&self) -> bool {
        self.weight.is_some()
    }

    /// Input feature dimension, if weighted.
    pub fn in_features(&self) -> Option<usize> {
        self.weight.as_ref().map(TensorData::cols)
    }

    /// Output feature dimension, if weighted.
    pub fn out_features(&self) -> Option<usize> {
        self.weight.as_ref().map(TensorData::rows)
    }
}
