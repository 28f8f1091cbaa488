//! Checkpoint manifest schema

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::modifier::Recipe;
use crate::pipeline::Degradation;
use crate::scheme::{Granularity, QuantMode};

/// Manifest format version. Bumped on breaking layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// How one payload entry is encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TensorRecord {
    /// Dense f32 weight, stored as-is
    Dense {
        /// Tensor shape
        shape: Vec<usize>,
        /// Whether a `<path>.mask` companion is present
        #[serde(default)]
        has_mask: bool,
    },
    /// Integer levels plus scale/zero-point companions
    Quantized {
        /// Tensor shape
        shape: Vec<usize>,
        /// Bit width of the levels
        bits: u8,
        /// Quantization mode
        mode: QuantMode,
        /// Granularity the scales are shaped for
        granularity: Granularity,
        /// Whether a `<path>.mask` companion is present
        #[serde(default)]
        has_mask: bool,
    },
}

impl TensorRecord {
    /// Whether a mask companion accompanies this tensor.
    pub fn has_mask(&self) -> bool {
        match self {
            TensorRecord::Dense { has_mask, .. } | TensorRecord::Quantized { has_mask, .. } => {
                *has_mask
            }
        }
    }
}

/// The `quantization_config.json` sidecar.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointManifest {
    /// Manifest format version
    pub format_version: u32,
    /// The recipe that produced this checkpoint
    pub recipe: Recipe,
    /// Per-tensor encoding records, keyed by layer path
    pub tensors: BTreeMap<String, TensorRecord>,
    /// Numerical degradations recorded during the run
    #[serde(default)]
    pub degradations: Vec<Degradation>,
    /// Hex SHA-256 digest of the payload file
    pub payload_digest: String,
}
