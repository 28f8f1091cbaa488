//! Canonical quantization argument structures

use serde::{Deserialize, Serialize};

use crate::error::{CompressError, Result};

use super::types::{Granularity, QuantMode};

/// Supported bit widths.
const SUPPORTED_BITS: [u8; 3] = [4, 8, 16];

/// Arguments for quantizing a single tensor family (weights or activations).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantArgs {
    /// Bit width (4, 8, or 16)
    pub bits: u8,
    /// Quantization mode
    pub mode: QuantMode,
    /// Quantization granularity
    pub granularity: Granularity,
}

impl QuantArgs {
    /// Symmetric per-tensor arguments.
    pub fn symmetric(bits: u8) -> Self {
        Self { bits, mode: QuantMode::Symmetric, granularity: Granularity::PerTensor }
    }

    /// Symmetric per-channel arguments.
    pub fn per_channel(bits: u8) -> Self {
        Self { bits, mode: QuantMode::Symmetric, granularity: Granularity::PerChannel }
    }

    /// Symmetric per-group arguments.
    pub fn per_group(bits: u8, size: usize) -> Self {
        Self { bits, mode: QuantMode::Symmetric, granularity: Granularity::PerGroup { size } }
    }

    /// Validate bit width and granularity.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BITS.contains(&self.bits) {
            return Err(CompressError::InvalidBits(self.bits));
        }
        if let Granularity::PerGroup { size } = self.granularity {
            if size == 0 {
                return Err(CompressError::InvalidGroupSize(size));
            }
        }
        Ok(())
    }

    /// Smallest representable integer level.
    pub fn q_min(&self) -> i32 {
        match self.mode {
            QuantMode::Symmetric => -(self.q_max()),
            QuantMode::Asymmetric => 0,
        }
    }

    /// Largest representable integer level.
    pub fn q_max(&self) -> i32 {
        match self.mode {
            QuantMode::Symmetric => (1i32 << (self.bits - 1)) - 1,
            QuantMode::Asymmetric => (1i32 << self.bits) - 1,
        }
    }

    /// Resolve the effective granularity for a tensor of the given shape.
    ///
    /// A group size that does not evenly divide the per-channel element
    /// count falls back to per-channel. Returns the effective granularity
    /// and whether a fallback occurred.
    pub fn effective_granularity(&self, shape: &[usize]) -> (Granularity, bool) {
        if let Granularity::PerGroup { size } = self.granularity {
            let per_channel = shape.last().copied().unwrap_or(1);
            if per_channel % size != 0 {
                return (Granularity::PerChannel, true);
            }
        }
        (self.granularity, false)
    }
}

/// Activation quantization arguments.
///
/// Activations are either calibrated statically (scale fixed from observed
/// ranges) or computed dynamically per forward pass by the inference engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivationArgs {
    /// Bit width (8 or 16)
    pub bits: u8,
    /// Quantization mode
    pub mode: QuantMode,
    /// Dynamic (per-pass) rather than static (calibrated) scales
    pub dynamic: bool,
}

impl ActivationArgs {
    /// Validate bit width.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BITS.contains(&self.bits) {
            return Err(CompressError::InvalidBits(self.bits));
        }
        Ok(())
    }
}

/// A complete quantization scheme: weight arguments plus optional
/// activation arguments.
///
/// `activations: None` means activations stay in the model's native float
/// precision (weight-only quantization, e.g. `W4A16`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantScheme {
    /// Weight quantization arguments
    pub weights: QuantArgs,
    /// Activation quantization arguments, if activations are quantized
    pub activations: Option<ActivationArgs>,
}

impl QuantScheme {
    /// Validate all embedded arguments.
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if let Some(acts) = &self.activations {
            acts.validate()?;
        }
        Ok(())
    }
}
