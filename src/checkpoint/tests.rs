use tempfile::TempDir;

use crate::error::CompressError;
use crate::model::{LayerNode, ModuleGraph, TensorData};
use crate::modifier::{CompressedArtifacts, Recipe, SparsityMask};
use crate::pipeline::CompressionReport;
use crate::scheme::{Granularity, QuantMode, QuantParams, QuantizedTensor};

use super::{write_checkpoint, Checkpoint, TensorRecord, MANIFEST_FILE, PAYLOAD_FILE};

fn sample_recipe() -> Recipe {
    Recipe::from_json(r#"[{"gptq": {"scheme": "W8A16", "targets": ["Linear"]}}]"#).unwrap()
}

fn sample_graph() -> ModuleGraph {
    ModuleGraph::new(vec![
        LayerNode::linear("fc1", TensorData::new(vec![0.1, 0.2, 0.3, 0.4], vec![2, 2])),
        LayerNode::passthrough("act", "ReLU"),
        LayerNode::linear("fc2", TensorData::new(vec![1.0, -1.0], vec![1, 2])),
    ])
}

fn sample_artifacts() -> CompressedArtifacts {
    let mut artifacts = CompressedArtifacts::default();
    artifacts.tensors.insert(
        "fc1".to_string(),
        QuantizedTensor {
            levels: vec![32, 64, 95, 127],
            params: QuantParams {
                scales: vec![0.00315],
                zero_points: vec![],
                granularity: Granularity::PerTensor,
                mode: QuantMode::Symmetric,
                bits: 8,
            },
            shape: vec![2, 2],
        },
    );
    artifacts
}

#[test]
fn test_roundtrip_is_bit_identical() {
    let tmp = TempDir::new().unwrap();
    let graph = sample_graph();
    let artifacts = sample_artifacts();

    write_checkpoint(
        tmp.path(),
        &graph,
        &artifacts,
        &sample_recipe(),
        &CompressionReport::default(),
    )
    .unwrap();

    let checkpoint = Checkpoint::load(tmp.path()).unwrap();
    let loaded = checkpoint.quantized("fc1").unwrap();
    assert_eq!(loaded, artifacts.tensors["fc1"]);
}

#[test]
fn test_untouched_tensors_pass_through() {
    let tmp = TempDir::new().unwrap();
    let graph = sample_graph();

    write_checkpoint(
        tmp.path(),
        &graph,
        &sample_artifacts(),
        &sample_recipe(),
        &CompressionReport::default(),
    )
    .unwrap();

    let checkpoint = Checkpoint::load(tmp.path()).unwrap();
    assert!(matches!(checkpoint.records()["fc2"], TensorRecord::Dense { .. }));
    let fc2 = checkpoint.dense("fc2").unwrap();
    assert_eq!(fc2.data, vec![1.0, -1.0]);
    assert_eq!(fc2.shape, vec![1, 2]);
    // Weightless layers are not persisted
    assert!(!checkpoint.records().contains_key("act"));
}

#[test]
fn test_mask_companion_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let graph = sample_graph();
    let mut artifacts = sample_artifacts();
    artifacts.masks.insert(
        "fc2".to_string(),
        SparsityMask { keep: vec![true, false], shape: vec![1, 2] },
    );

    write_checkpoint(
        tmp.path(),
        &graph,
        &artifacts,
        &sample_recipe(),
        &CompressionReport::default(),
    )
    .unwrap();

    let checkpoint = Checkpoint::load(tmp.path()).unwrap();
    let mask = checkpoint.mask("fc2").unwrap().unwrap();
    assert_eq!(mask.keep, vec![true, false]);
    assert!(checkpoint.mask("fc1").unwrap().is_none());
}

#[test]
fn test_corrupted_payload_fails_digest_check() {
    let tmp = TempDir::new().unwrap();
    write_checkpoint(
        tmp.path(),
        &sample_graph(),
        &sample_artifacts(),
        &sample_recipe(),
        &CompressionReport::default(),
    )
    .unwrap();

    // Flip one byte near the end of the payload (tensor data region)
    let payload_path = tmp.path().join(PAYLOAD_FILE);
    let mut bytes = std::fs::read(&payload_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&payload_path, bytes).unwrap();

    let err = Checkpoint::load(tmp.path()).unwrap_err();
    assert!(matches!(err, CompressError::ChecksumMismatch { .. }));
}

#[test]
fn test_malformed_manifest_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_checkpoint(
        tmp.path(),
        &sample_graph(),
        &sample_artifacts(),
        &sample_recipe(),
        &CompressionReport::default(),
    )
    .unwrap();

    std::fs::write(tmp.path().join(MANIFEST_FILE), "{not json").unwrap();
    let err = Checkpoint::load(tmp.path()).unwrap_err();
    assert!(matches!(err, CompressError::MalformedCheckpoint { .. }));
}

#[test]
fn test_manifest_echoes_recipe_and_digest() {
    let tmp = TempDir::new().unwrap();
    let recipe = sample_recipe();
    let paths = write_checkpoint(
        tmp.path(),
        &sample_graph(),
        &sample_artifacts(),
        &recipe,
        &CompressionReport::default(),
    )
    .unwrap();

    let checkpoint = Checkpoint::load(tmp.path()).unwrap();
    assert_eq!(checkpoint.manifest().recipe, recipe);
    assert_eq!(checkpoint.manifest().format_version, super::FORMAT_VERSION);
    assert!(paths.payload.exists());
    assert!(paths.manifest.exists());
    // No temporary staging files left behind
    assert!(!tmp.path().join(format!("{PAYLOAD_FILE}.tmp")).exists());
}

#[test]
fn test_materialize_dequantizes() {
    let tmp = TempDir::new().unwrap();
    write_checkpoint(
        tmp.path(),
        &sample_graph(),
        &sample_artifacts(),
        &sample_recipe(),
        &CompressionReport::default(),
    )
    .unwrap();

    let checkpoint = Checkpoint::load(tmp.path()).unwrap();
    let dense = checkpoint.materialize("fc1").unwrap();
    assert_eq!(dense.shape, vec![2, 2]);
    approx::assert_abs_diff_eq!(dense.data[0], 32.0 * 0.00315, epsilon = 1e-6);
}
