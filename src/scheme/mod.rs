//! Quantization scheme registry
//!
//! Defines the vocabulary of numeric formats (bit width, symmetry,
//! granularity, static vs dynamic activations) and validates scheme
//! strings into a canonical representation:
//! - **Per-tensor**: single scale/zero-point for the whole tensor
//! - **Per-channel**: scale/zero-point per output channel
//! - **Per-group**: scale/zero-point per group of input elements
//!
//! Presets follow the deployment-format naming used by inference engines
//! (`W4A16` = 4-bit weights, 16-bit float activations).

mod args;
mod params;
mod parse;
#[cfg(test)]
mod tests;
mod types;

pub use args::{ActivationArgs, QuantArgs, QuantScheme};
pub use params::{
    dequantize_with_params, quantize_with_params, QuantParams, QuantizedTensor,
};
pub(crate) use params::{derive_group, quantize_value};
pub use types::{Granularity, QuantMode};
