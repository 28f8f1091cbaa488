//! Quantization parameters and integer-level kernels
//!
//! `QuantParams` is the per-tensor artifact the pipeline persists: scales
//! shaped per granularity, zero-points only for asymmetric schemes. The
//! kernels here map floats onto integer levels and back; symmetric schemes
//! map 0.0 to level 0 exactly.

use serde::{Deserialize, Serialize};

use super::args::QuantArgs;
use super::types::{Granularity, QuantMode};

/// Minimum representable scale, to avoid division by zero at inference.
pub(crate) const SCALE_EPSILON: f32 = 1e-10;

/// Quantization parameters for one tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Scale factor per parameter group. Every entry is > 0.
    pub scales: Vec<f32>,
    /// Zero point per parameter group. Empty for symmetric quantization.
    pub zero_points: Vec<i32>,
    /// Granularity the scales are shaped for
    pub granularity: Granularity,
    /// Quantization mode
    pub mode: QuantMode,
    /// Bit width
    pub bits: u8,
}

impl QuantParams {
    /// Number of parameter groups.
    pub fn num_groups(&self) -> usize {
        self.scales.len()
    }

    /// Check if asymmetric quantization.
    pub fn is_asymmetric(&self) -> bool {
        self.mode == QuantMode::Asymmetric
    }

    /// Scale and zero-point for the flat element index `i` of a row-major
    /// tensor with the given shape.
    pub fn group_params(&self, i: usize, shape: &[usize]) -> (f32, i32) {
        let g = self.granularity.group_index(i, shape);
        let scale = self.scales.get(g).copied().unwrap_or(1.0);
        let zp = self.zero_points.get(g).copied().unwrap_or(0);
        (scale, zp)
    }

    /// Derive parameters from per-group (min, max) ranges.
    ///
    /// Zero-variance groups (min == max == 0) clamp the scale to a small
    /// positive epsilon rather than producing a zero scale.
    pub fn from_ranges(
        ranges: &[(f32, f32)],
        args: &QuantArgs,
        granularity: Granularity,
    ) -> Self {
        let mut scales = Vec::with_capacity(ranges.len());
        let mut zero_points = Vec::new();

        for &(min, max) in ranges {
            let (scale, zp) = derive_group(min, max, args);
            scales.push(scale);
            if args.mode == QuantMode::Asymmetric {
                zero_points.push(zp);
            }
        }

        Self { scales, zero_points, granularity, mode: args.mode, bits: args.bits }
    }
}

/// Scale and zero-point for a single group's observed (min, max) range.
pub(crate) fn derive_group(min: f32, max: f32, args: &QuantArgs) -> (f32, i32) {
    let q_max = args.q_max();
    let q_min = args.q_min();
    match args.mode {
        QuantMode::Symmetric => {
            let max_abs = min.abs().max(max.abs());
            ((max_abs / q_max as f32).max(SCALE_EPSILON), 0)
        }
        QuantMode::Asymmetric => {
            // Include zero in the range so zero is representable
            let min = min.min(0.0);
            let max = max.max(0.0);
            let scale = ((max - min) / (q_max - q_min) as f32).max(SCALE_EPSILON);
            let zp = (q_min as f32 - min / scale).round() as i32;
            (scale, zp.clamp(q_min, q_max))
        }
    }
}

/// A quantized tensor: integer levels plus the parameters to dequantize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    /// Integer levels, row-major
    pub levels: Vec<i32>,
    /// Quantization parameters
    pub params: QuantParams,
    /// Original shape
    pub shape: Vec<usize>,
}

impl QuantizedTensor {
    /// Dequantize back into floats.
    pub fn dequantize(&self) -> Vec<f32> {
        dequantize_with_params(&self.levels, &self.params, &self.shape)
    }
}

/// Quantize a single value at the given scale/zero-point.
pub(crate) fn quantize_value(value: f32, scale: f32, zp: i32, q_min: i32, q_max: i32) -> i32 {
    ((value / scale).round() as i32 + zp).clamp(q_min, q_max)
}

/// Quantize a row-major tensor using precomputed parameters.
pub fn quantize_with_params(values: &[f32], params: &QuantParams, shape: &[usize]) -> Vec<i32> {
    let q_max = match params.mode {
        QuantMode::Symmetric => (1i32 << (params.bits - 1)) - 1,
        QuantMode::Asymmetric => (1i32 << params.bits) - 1,
    };
    let q_min = match params.mode {
        QuantMode::Symmetric => -q_max,
        QuantMode::Asymmetric => 0,
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &val)| {
            let (scale, zp) = params.group_params(i, shape);
            quantize_value(val, scale, zp, q_min, q_max)
        })
        .collect()
}

/// Dequantize integer levels using the given parameters.
pub fn dequantize_with_params(levels: &[i32], params: &QuantParams, shape: &[usize]) -> Vec<f32> {
    levels
        .iter()
        .enumerate()
        .map(|(i, &q)| {
            let (scale, zp) = params.group_params(i, shape);
            (q - zp) as f32 * scale
        })
        .collect()
}
