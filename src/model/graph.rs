//! Module graph: ordered layers with a tappable forward pass

use super::layer::LayerNode;
use super::tensor::TensorData;

/// Error raised by a forward pass.
///
/// Carries the layer where the pass failed so calibration failures can be
/// attributed.
#[derive(Debug, Clone)]
pub struct ForwardError {
    /// Path of the layer that failed
    pub layer: String,
    /// What went wrong
    pub reason: String,
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "forward pass failed at '{}': {}", self.layer, self.reason)
    }
}

/// An ordered graph of named layers.
///
/// Order is the model's stable traversal order; the target resolver and the
/// algorithm engines rely on it for reproducible output. Activations flow
/// through layers sequentially: weighted layers apply `y = W x`, weightless
/// layers pass through.
#[derive(Clone, Debug, Default)]
pub struct ModuleGraph {
    nodes: Vec<LayerNode>,
}

impl ModuleGraph {
    /// Build a graph from layers in traversal order.
    pub fn new(nodes: Vec<LayerNode>) -> Self {
        Self { nodes }
    }

    /// Layers in traversal order.
    pub fn layers(&self) -> &[LayerNode] {
        &self.nodes
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no layers.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a layer by path.
    pub fn get(&self, path: &str) -> Option<&LayerNode> {
        self.nodes.iter().find(|n| n.path == path)
    }

    /// Mutable lookup by path.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut LayerNode> {
        self.nodes.iter_mut().find(|n| n.path == path)
    }

    /// Replace a layer's weight atomically (whole tensor or nothing).
    pub fn set_weight(&mut self, path: &str, weight: TensorData) -> bool {
        match self.get_mut(path) {
            Some(node) => {
                node.weight = Some(weight);
                true
            }
            None => false,
        }
    }

    /// The next weighted layer after `path` in traversal order: the
    /// adjacency-linked consumer of its output activations.
    pub fn next_weighted(&self, path: &str) -> Option<&LayerNode> {
        let idx = self.nodes.iter().position(|n| n.path == path)?;
        self.nodes[idx + 1..].iter().find(|n| n.is_weighted())
    }

    /// Run one sample through the graph, invoking `tap` with each layer's
    /// input and output activations.
    ///
    /// Activations are handed to `tap` and then dropped; nothing is retained
    /// beyond the current layer.
    pub fn forward<F>(&self, sample: &[f32], mut tap: F) -> Result<Vec<f32>, ForwardError>
    where
        F: FnMut(&str, &[f32], &[f32]),
    {
        let mut current = sample.to_vec();
        for node in &self.nodes {
            let output = match &node.weight {
                Some(w) => matvec(w, &current).map_err(|reason| ForwardError {
                    layer: node.path.clone(),
                    reason,
                })?,
                None => current.clone(),
            };
            tap(&node.path, &current, &output);
            current = output;
        }
        Ok(current)
    }
}

/// `y = W x` for a `[rows, cols]` weight.
fn matvec(weight: &TensorData, x: &[f32]) -> Result<Vec<f32>, String> {
    let rows = weight.rows();
    let cols = weight.cols();
    if x.len() != cols {
        return Err(format!("input dimension {} does not match weight columns {}", x.len(), cols));
    }
    let mut y = vec![0.0f32; rows];
    for (r, out) in y.iter_mut().enumerate() {
        let row = &weight.data[r * cols..(r + 1) * cols];
        let mut acc = 0.0f32;
        for (w, v) in row.iter().zip(x) {
            acc += w * v;
        }
        if !acc.is_finite() {
            return Err(format!("non-finite activation in output channel {r}"));
        }
        *out = acc;
    }
    Ok(y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer_graph() -> ModuleGraph {
        ModuleGraph::new(vec![
            LayerNode::linear("fc1", TensorData::new(vec![1.0, 0.0, 0.0, 2.0], vec![2, 2])),
            LayerNode::passthrough("act", "ReLU"),
            LayerNode::linear("fc2", TensorData::new(vec![0.5, 0.5, 1.0, -1.0], vec![2, 2])),
        ])
    }

    #[test]
    fn test_forward_taps_every_layer() {
        let graph = two_layer_graph();
        let mut seen = Vec::new();
        let out = graph
            .forward(&[1.0, 1.0], |path, input, output| {
                seen.push((path.to_string(), input.to_vec(), output.to_vec()));
            })
            .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, "fc1");
        assert_eq!(seen[0].2, vec![1.0, 2.0]);
        // Pass-through layer leaves activations unchanged
        assert_eq!(seen[1].1, seen[1].2);
        assert_eq!(out, vec![1.5, -1.0]);
    }

    #[test]
    fn test_forward_dimension_mismatch() {
        let graph = two_layer_graph();
        let err = graph.forward(&[1.0, 1.0, 1.0], |_, _, _| {}).unwrap_err();
        assert_eq!(err.layer, "fc1");
    }

    #[test]
    fn test_next_weighted_skips_passthrough() {
        let graph = two_layer_graph();
        assert_eq!(graph.next_weighted("fc1").unwrap().path, "fc2");
        assert!(graph.next_weighted("fc2").is_none());
    }
}
