//! Checkpoint writer

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use safetensors::tensor::{Dtype, TensorView};
use sha2::{Digest, Sha256};

use crate::error::{CompressError, Result};
use crate::model::ModuleGraph;
use crate::modifier::{CompressedArtifacts, Recipe};
use crate::pipeline::CompressionReport;

use super::manifest::{CheckpointManifest, TensorRecord, FORMAT_VERSION};
use super::{MANIFEST_FILE, PAYLOAD_FILE};

/// Paths of the files a write produced.
#[derive(Clone, Debug)]
pub struct CheckpointPaths {
    /// The safetensors payload
    pub payload: PathBuf,
    /// The manifest sidecar
    pub manifest: PathBuf,
}

/// Serialize a compressed model into `dir`.
///
/// Every weighted layer in the graph lands in the payload: compressed
/// layers as integer levels with their parameter companions, untouched
/// layers as dense f32. The write is atomic; an existing checkpoint in
/// `dir` is replaced only once both files are complete.
///
/// # Errors
///
/// Returns [`CompressError::Persistence`] if serialization fails and
/// [`CompressError::Io`] on filesystem failures.
pub fn write_checkpoint(
    dir: impl AsRef<Path>,
    graph: &ModuleGraph,
    artifacts: &CompressedArtifacts,
    recipe: &Recipe,
    report: &CompressionReport,
) -> Result<CheckpointPaths> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut records: BTreeMap<String, TensorRecord> = BTreeMap::new();
    let mut buffers: Vec<(String, Dtype, Vec<usize>, Vec<u8>)> = Vec::new();

    for node in graph.layers() {
        let Some(weight) = &node.weight else {
            continue;
        };
        let path = &node.path;
        let mask = artifacts.masks.get(path);

        match artifacts.tensors.get(path) {
            Some(quantized) => {
                let params = &quantized.params;
                records.insert(
                    path.clone(),
                    TensorRecord::Quantized {
                        shape: quantized.shape.clone(),
                        bits: params.bits,
                        mode: params.mode,
                        granularity: params.granularity,
                        has_mask: mask.is_some(),
                    },
                );
                buffers.push((
                    path.clone(),
                    Dtype::I32,
                    quantized.shape.clone(),
                    bytemuck::cast_slice(&quantized.levels).to_vec(),
                ));
                buffers.push((
                    format!("{path}.scale"),
                    Dtype::F32,
                    vec![params.scales.len()],
                    bytemuck::cast_slice(&params.scales).to_vec(),
                ));
                if params.is_asymmetric() {
                    buffers.push((
                        format!("{path}.zero_point"),
                        Dtype::I32,
                        vec![params.zero_points.len()],
                        bytemuck::cast_slice(&params.zero_points).to_vec(),
                    ));
                }
            }
            None => {
                records.insert(
                    path.clone(),
                    TensorRecord::Dense { shape: weight.shape.clone(), has_mask: mask.is_some() },
                );
                buffers.push((
                    path.clone(),
                    Dtype::F32,
                    weight.shape.clone(),
                    bytemuck::cast_slice(&weight.data).to_vec(),
                ));
            }
        }

        if let Some(mask) = mask {
            let bytes: Vec<u8> = mask.keep.iter().map(|&k| u8::from(k)).collect();
            buffers.push((format!("{path}.mask"), Dtype::U8, mask.shape.clone(), bytes));
        }
    }

    let views: Vec<(&str, TensorView<'_>)> = buffers
        .iter()
        .map(|(name, dtype, shape, bytes)| {
            let view = TensorView::new(*dtype, shape.clone(), bytes)
                .map_err(|e| CompressError::Persistence(e.to_string()))?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<_>>()?;

    let payload_bytes = safetensors::serialize(views, &None)
        .map_err(|e| CompressError::Persistence(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&payload_bytes);
    let payload_digest = hex::encode(hasher.finalize());

    let manifest = CheckpointManifest {
        format_version: FORMAT_VERSION,
        recipe: recipe.clone(),
        tensors: records,
        degradations: report.degradations.clone(),
        payload_digest,
    };
    let manifest_json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| CompressError::Persistence(e.to_string()))?;

    // Stage under temporary names, then rename into place. Readers either
    // see the previous checkpoint or this one, never a mixture.
    let payload_path = dir.join(PAYLOAD_FILE);
    let manifest_path = dir.join(MANIFEST_FILE);
    let payload_tmp = dir.join(format!("{PAYLOAD_FILE}.tmp"));
    let manifest_tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));

    std::fs::write(&payload_tmp, &payload_bytes)?;
    std::fs::write(&manifest_tmp, manifest_json)?;
    std::fs::rename(&payload_tmp, &payload_path)?;
    std::fs::rename(&manifest_tmp, &manifest_path)?;

    Ok(CheckpointPaths { payload: payload_path, manifest: manifest_path })
}
