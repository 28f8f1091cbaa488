//! Granularity and mode type definitions

use serde::{Deserialize, Serialize};

/// Quantization granularity options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Granularity {
    /// Single scale/zero-point for the entire tensor
    #[default]
    PerTensor,
    /// Separate scale/zero-point per output channel (axis 0 for weights)
    PerChannel,
    /// Separate scale/zero-point per group of elements along the input axis
    PerGroup {
        /// Number of elements per group
        size: usize,
    },
}

impl Granularity {
    /// Number of parameter groups for a tensor of the given shape.
    ///
    /// Shape is interpreted as `[channels, elements_per_channel]` for 2-D
    /// weights and `[elements]` for 1-D tensors.
    pub fn num_groups(&self, shape: &[usize]) -> usize {
        let (channels, per_channel) = split_shape(shape);
        match self {
            Granularity::PerTensor => 1,
            Granularity::PerChannel => channels,
            Granularity::PerGroup { size } => channels * per_channel.div_ceil(*size),
        }
    }

    /// Parameter group index for the flat element index `i` in a row-major
    /// tensor of the given shape.
    pub fn group_index(&self, i: usize, shape: &[usize]) -> usize {
        let (_, per_channel) = split_shape(shape);
        match self {
            Granularity::PerTensor => 0,
            Granularity::PerChannel => i / per_channel,
            Granularity::PerGroup { size } => {
                let groups_per_channel = per_channel.div_ceil(*size);
                (i / per_channel) * groups_per_channel + (i % per_channel) / size
            }
        }
    }
}

/// Split a shape into (channels, elements per channel).
fn split_shape(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (1, *n),
        [c, rest @ ..] => (*c, rest.iter().product::<usize>().max(1)),
    }
}

/// Quantization mode: symmetric or asymmetric
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantMode {
    /// Symmetric: zero-point = 0, range = [-max_abs, max_abs]
    #[default]
    Symmetric,
    /// Asymmetric: zero-point != 0, range = [min, max]
    Asymmetric,
}
