//! Forward pass driver with per-layer activation taps

use std::collections::BTreeSet;

use crate::error::{CompressError, Result};
use crate::model::ModuleGraph;

/// A finite, restartable sequence of calibration samples.
///
/// Produced by an external data-loading collaborator; the driver only
/// requires indexed access so a run can be restarted per pipeline stage.
pub trait CalibrationSource {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Whether the source holds no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sample at `index`. Called with `index < len()`.
    fn sample(&self, index: usize) -> &[f32];
}

impl CalibrationSource for Vec<Vec<f32>> {
    fn len(&self) -> usize {
        self.len()
    }

    fn sample(&self, index: usize) -> &[f32] {
        &self[index]
    }
}

impl CalibrationSource for [Vec<f32>] {
    fn len(&self) -> usize {
        self.len()
    }

    fn sample(&self, index: usize) -> &[f32] {
        &self[index]
    }
}

/// Drives calibration forward passes, dispatching activations for the
/// subscribed layers.
///
/// Contract: for each sample, in sample order, the callback fires exactly
/// once per subscribed layer, with that layer's input and output
/// activations. A failed forward pass aborts the run with the offending
/// sample index and layer; samples are never silently skipped.
#[derive(Debug, Default)]
pub struct ForwardDriver {
    subscribed: BTreeSet<String>,
}

impl ForwardDriver {
    /// Create a driver with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a layer path.
    pub fn subscribe(&mut self, layer: impl Into<String>) {
        self.subscribed.insert(layer.into());
    }

    /// Subscribe every path in the iterator.
    pub fn subscribe_all<I, S>(&mut self, layers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for layer in layers {
            self.subscribed.insert(layer.into());
        }
    }

    /// Subscribed layer paths.
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscribed.iter().map(String::as_str)
    }

    /// Run every sample through the graph.
    ///
    /// Returns the number of samples processed.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::Calibration`] identifying the sample and
    /// layer if a forward pass fails.
    pub fn run<S, F>(&self, graph: &ModuleGraph, source: &S, mut on_activation: F) -> Result<usize>
    where
        S: CalibrationSource + ?Sized,
        F: FnMut(usize, &str, &[f32], &[f32]),
    {
        for index in 0..source.len() {
            graph
                .forward(source.sample(index), |layer, input, output| {
                    if self.subscribed.contains(layer) {
                        on_activation(index, layer, input, output);
                    }
                })
                .map_err(|e| CompressError::Calibration {
                    sample_index: index,
                    layer: e.layer,
                    reason: e.reason,
                })?;
        }
        Ok(source.len())
    }
}
