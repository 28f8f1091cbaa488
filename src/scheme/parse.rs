//! Scheme preset parsing
//!
//! Maps deployment-format preset strings onto canonical [`QuantScheme`]
//! values. The preset vocabulary matches what downstream inference engines
//! accept, so a recipe written for one model can be reused on another.

use std::str::FromStr;

use crate::error::{CompressError, Result};

use super::args::{ActivationArgs, QuantArgs, QuantScheme};
use super::types::{Granularity, QuantMode};

impl QuantScheme {
    /// 4-bit grouped weights (group 128), float activations.
    pub fn w4a16() -> Self {
        Self {
            weights: QuantArgs {
                bits: 4,
                mode: QuantMode::Symmetric,
                granularity: Granularity::PerGroup { size: 128 },
            },
            activations: None,
        }
    }

    /// 4-bit grouped weights, dynamic 8-bit activations.
    pub fn w4a8() -> Self {
        Self {
            weights: QuantArgs {
                bits: 4,
                mode: QuantMode::Symmetric,
                granularity: Granularity::PerGroup { size: 128 },
            },
            activations: Some(ActivationArgs {
                bits: 8,
                mode: QuantMode::Symmetric,
                dynamic: true,
            }),
        }
    }

    /// 8-bit per-channel weights, static 8-bit activations.
    pub fn w8a8() -> Self {
        Self {
            weights: QuantArgs {
                bits: 8,
                mode: QuantMode::Symmetric,
                granularity: Granularity::PerChannel,
            },
            activations: Some(ActivationArgs {
                bits: 8,
                mode: QuantMode::Symmetric,
                dynamic: false,
            }),
        }
    }

    /// 8-bit per-channel weights, float activations.
    pub fn w8a16() -> Self {
        Self {
            weights: QuantArgs {
                bits: 8,
                mode: QuantMode::Symmetric,
                granularity: Granularity::PerChannel,
            },
            activations: None,
        }
    }

    /// Parse a preset name, then apply an optional group-size override.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::UnknownScheme`] for unrecognized presets and
    /// [`CompressError::InvalidGroupSize`] for a zero group size.
    pub fn parse(name: &str, group_size: Option<usize>) -> Result<Self> {
        let mut scheme = name.parse::<QuantScheme>()?;
        if let Some(size) = group_size {
            if size == 0 {
                return Err(CompressError::InvalidGroupSize(size));
            }
            scheme.weights.granularity = Granularity::PerGroup { size };
        }
        scheme.validate()?;
        Ok(scheme)
    }
}

impl FromStr for QuantScheme {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "W4A16" => Ok(Self::w4a16()),
            "W4A8" => Ok(Self::w4a8()),
            "W8A8" => Ok(Self::w8a8()),
            "W8A16" => Ok(Self::w8a16()),
            _ => Err(CompressError::UnknownScheme(s.to_string())),
        }
    }
}
