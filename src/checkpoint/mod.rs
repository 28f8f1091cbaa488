//! Compressed checkpoint persistence
//!
//! A checkpoint is a directory holding:
//! - `model.safetensors`: one payload with every tensor. Compressed layers
//!   store integer levels under the layer path plus `<path>.scale`,
//!   `<path>.zero_point` (asymmetric only), and `<path>.mask` (pruned
//!   only) companions; untouched layers store their dense f32 weight.
//! - `quantization_config.json`: the manifest an inference engine needs to
//!   interpret the payload, the recipe that produced it, any recorded
//!   degradations, and a SHA-256 digest of the payload.
//!
//! Writes are atomic: both files land under temporary names and are
//! renamed into place only after everything is fully written, so a
//! crashed run never leaves a half-written checkpoint that passes the
//! digest check.

mod manifest;
mod reader;
#[cfg(test)]
mod tests;
mod writer;

pub use manifest::{CheckpointManifest, TensorRecord, FORMAT_VERSION};
pub use reader::Checkpoint;
pub use writer::{write_checkpoint, CheckpointPaths};

/// Payload file name inside a checkpoint directory.
pub const PAYLOAD_FILE: &str = "model.safetensors";

/// Manifest file name inside a checkpoint directory.
pub const MANIFEST_FILE: &str = "quantization_config.json";
