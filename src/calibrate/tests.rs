//! Tests for the calibration forward driver.

use super::*;
use crate::error::CompressError;
use crate::model::{LayerNode, ModuleGraph, TensorData};

fn chain_graph() -> ModuleGraph {
    ModuleGraph::new(vec![
        LayerNode::linear("fc1", TensorData::new(vec![1.0, 0.0, 0.0, 1.0], vec![2, 2])),
        LayerNode::linear("fc2", TensorData::new(vec![2.0, 0.0, 0.0, 2.0], vec![2, 2])),
    ])
}

#[test]
fn test_one_invocation_per_layer_per_sample() {
    let graph = chain_graph();
    let samples = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];

    let mut driver = ForwardDriver::new();
    driver.subscribe("fc1");
    driver.subscribe("fc2");

    let mut invocations = Vec::new();
    let processed = driver
        .run(&graph, &samples, |sample, layer, _, _| {
            invocations.push((sample, layer.to_string()));
        })
        .unwrap();

    assert_eq!(processed, 3);
    assert_eq!(invocations.len(), 6);
    // Sample order, layer order within each sample
    assert_eq!(invocations[0], (0, "fc1".to_string()));
    assert_eq!(invocations[1], (0, "fc2".to_string()));
    assert_eq!(invocations[4], (2, "fc1".to_string()));
}

#[test]
fn test_unsubscribed_layers_not_dispatched() {
    let graph = chain_graph();
    let samples = vec![vec![1.0, 1.0]];

    let mut driver = ForwardDriver::new();
    driver.subscribe("fc2");

    let mut layers = Vec::new();
    driver
        .run(&graph, &samples, |_, layer, _, _| layers.push(layer.to_string()))
        .unwrap();

    assert_eq!(layers, vec!["fc2"]);
}

#[test]
fn test_activations_flow_through_chain() {
    let graph = chain_graph();
    let samples = vec![vec![1.0, 2.0]];

    let mut driver = ForwardDriver::new();
    driver.subscribe("fc2");

    driver
        .run(&graph, &samples, |_, _, input, output| {
            // fc2 sees fc1's (identity) output as input
            assert_eq!(input, &[1.0, 2.0]);
            assert_eq!(output, &[2.0, 4.0]);
        })
        .unwrap();
}

#[test]
fn test_malformed_sample_aborts_with_context() {
    let graph = chain_graph();
    let samples = vec![vec![1.0, 2.0], vec![1.0, 2.0, 3.0]];

    let mut driver = ForwardDriver::new();
    driver.subscribe("fc1");

    let err = driver.run(&graph, &samples, |_, _, _, _| {}).unwrap_err();
    match err {
        CompressError::Calibration { sample_index, layer, .. } => {
            assert_eq!(sample_index, 1);
            assert_eq!(layer, "fc1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_empty_source() {
    let graph = chain_graph();
    let samples: Vec<Vec<f32>> = Vec::new();
    let driver = ForwardDriver::new();
    let processed = driver.run(&graph, &samples, |_, _, _, _| {}).unwrap();
    assert_eq!(processed, 0);
}
