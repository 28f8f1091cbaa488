//! Checkpoint reader

use std::collections::BTreeMap;
use std::path::Path;

use safetensors::tensor::Dtype;
use safetensors::SafeTensors;
use sha2::{Digest, Sha256};

use crate::error::{CompressError, Result};
use crate::model::TensorData;
use crate::modifier::SparsityMask;
use crate::scheme::{QuantParams, QuantizedTensor};

use super::manifest::{CheckpointManifest, TensorRecord};
use super::{MANIFEST_FILE, PAYLOAD_FILE};

/// A loaded, digest-verified checkpoint.
#[derive(Debug)]
pub struct Checkpoint {
    manifest: CheckpointManifest,
    payload: Vec<u8>,
}

impl Checkpoint {
    /// Load a checkpoint directory, verifying the payload digest.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::ChecksumMismatch`] if the payload does not
    /// match the manifest's digest, and
    /// [`CompressError::MalformedCheckpoint`] for undecodable content.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_json = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: CheckpointManifest =
            serde_json::from_str(&manifest_json).map_err(|e| {
                CompressError::MalformedCheckpoint {
                    name: MANIFEST_FILE.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let payload = std::fs::read(dir.join(PAYLOAD_FILE))?;
        let mut hasher = Sha256::new();
        hasher.update(&payload);
        let actual = hex::encode(hasher.finalize());
        if actual != manifest.payload_digest {
            return Err(CompressError::ChecksumMismatch {
                expected: manifest.payload_digest.clone(),
                actual,
            });
        }

        // Validate the payload parses before handing anything out
        SafeTensors::deserialize(&payload).map_err(|e| CompressError::MalformedCheckpoint {
            name: PAYLOAD_FILE.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { manifest, payload })
    }

    /// The manifest.
    pub fn manifest(&self) -> &CheckpointManifest {
        &self.manifest
    }

    /// Per-tensor encoding records.
    pub fn records(&self) -> &BTreeMap<String, TensorRecord> {
        &self.manifest.tensors
    }

    fn view(&self, name: &str, expect: Dtype) -> Result<(Vec<usize>, Vec<u8>)> {
        let tensors = SafeTensors::deserialize(&self.payload)
            .map_err(|e| CompressError::MalformedCheckpoint {
                name: PAYLOAD_FILE.to_string(),
                reason: e.to_string(),
            })?;
        let view = tensors.tensor(name).map_err(|e| CompressError::MalformedCheckpoint {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        if view.dtype() != expect {
            return Err(CompressError::MalformedCheckpoint {
                name: name.to_string(),
                reason: format!("expected dtype {expect:?}, found {:?}", view.dtype()),
            });
        }
        Ok((view.shape().to_vec(), view.data().to_vec()))
    }

    /// Reconstruct a quantized tensor bit-identically to what the writer
    /// persisted.
    pub fn quantized(&self, name: &str) -> Result<QuantizedTensor> {
        let record = self.manifest.tensors.get(name).ok_or_else(|| {
            CompressError::MalformedCheckpoint {
                name: name.to_string(),
                reason: "not present in manifest".to_string(),
            }
        })?;
        let TensorRecord::Quantized { shape, bits, mode, granularity, .. } = record else {
            return Err(CompressError::MalformedCheckpoint {
                name: name.to_string(),
                reason: "recorded as dense, not quantized".to_string(),
            });
        };

        let (level_shape, level_bytes) = self.view(name, Dtype::I32)?;
        if &level_shape != shape {
            return Err(CompressError::MalformedCheckpoint {
                name: name.to_string(),
                reason: format!("payload shape {level_shape:?} disagrees with manifest {shape:?}"),
            });
        }
        let levels: Vec<i32> = bytemuck::pod_collect_to_vec(&level_bytes);

        let (_, scale_bytes) = self.view(&format!("{name}.scale"), Dtype::F32)?;
        let scales: Vec<f32> = bytemuck::pod_collect_to_vec(&scale_bytes);

        let zero_points = if mode == &crate::scheme::QuantMode::Asymmetric {
            let (_, zp_bytes) = self.view(&format!("{name}.zero_point"), Dtype::I32)?;
            bytemuck::pod_collect_to_vec(&zp_bytes)
        } else {
            Vec::new()
        };

        Ok(QuantizedTensor {
            levels,
            params: QuantParams {
                scales,
                zero_points,
                granularity: *granularity,
                mode: *mode,
                bits: *bits,
            },
            shape: shape.clone(),
        })
    }

    /// Load a dense (uncompressed) tensor.
    pub fn dense(&self, name: &str) -> Result<TensorData> {
        let (shape, bytes) = self.view(name, Dtype::F32)?;
        let data: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        Ok(TensorData::new(data, shape))
    }

    /// Load a tensor's sparsity mask, if one was persisted.
    pub fn mask(&self, name: &str) -> Result<Option<SparsityMask>> {
        match self.manifest.tensors.get(name) {
            Some(record) if record.has_mask() => {
                let (shape, bytes) = self.view(&format!("{name}.mask"), Dtype::U8)?;
                let keep = bytes.into_iter().map(|b| b != 0).collect();
                Ok(Some(SparsityMask { keep, shape }))
            }
            _ => Ok(None),
        }
    }

    /// Materialize any tensor as dense f32: quantized entries are
    /// dequantized, dense entries load as-is.
    pub fn materialize(&self, name: &str) -> Result<TensorData> {
        match self.manifest.tensors.get(name) {
            Some(TensorRecord::Quantized { shape, .. }) => {
                let quantized = self.quantized(name)?;
                Ok(TensorData::new(quantized.dequantize(), shape.clone()))
            }
            Some(TensorRecord::Dense { .. }) => self.dense(name),
            None => Err(CompressError::MalformedCheckpoint {
                name: name.to_string(),
                reason: "not present in manifest".to_string(),
            }),
        }
    }
}
