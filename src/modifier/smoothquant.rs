//! SmoothQuant: activation-to-weight difficulty migration
//!
//! For each target layer with an adjacency-linked consumer, computes a
//! per-channel smoothing factor `s_c = amax_act_c^α / amax_w_c^(1-α)` over
//! the channel interface between them, divides the producer's output rows
//! by `s_c`, and multiplies the consumer's input columns by `s_c`. The
//! composed function is unchanged, but activation dynamic range shrinks
//! where weights can absorb it.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{ModuleGraph, TensorData};
use crate::pipeline::PipelineStage;
use crate::target::{resolve_targets, ResolutionWarning, TargetSelector};

use super::{Modifier, StageContext};

/// Smoothing factors never collapse below this floor.
const SMOOTH_EPSILON: f32 = 1e-10;

/// Activation-smoothing rebalancing modifier.
pub struct SmoothQuantModifier {
    alpha: f32,
    selector: TargetSelector,
    /// Resolved producer layers, graph order
    targets: Vec<String>,
    /// producer -> consumer pairing discovered at bind
    consumers: BTreeMap<String, String>,
    /// Running per-channel |activation| max at each consumer's input
    act_absmax: BTreeMap<String, Vec<f32>>,
}

impl SmoothQuantModifier {
    /// Create a modifier with the given smoothing strength.
    pub fn new(alpha: f32, selector: TargetSelector) -> Self {
        Self {
            alpha,
            selector,
            targets: Vec::new(),
            consumers: BTreeMap::new(),
            act_absmax: BTreeMap::new(),
        }
    }

    fn smooth_pair(
        &self,
        producer: &TensorData,
        consumer: &TensorData,
        act_max: &[f32],
    ) -> Option<(TensorData, TensorData)> {
        let channels = consumer.cols();
        if producer.rows() != channels || act_max.len() != channels {
            return None;
        }

        let mut scales = vec![1.0f32; channels];
        for c in 0..channels {
            // Per-input-channel weight magnitude at the consumer
            let mut w_max = 0.0f32;
            for r in 0..consumer.rows() {
                w_max = w_max.max(consumer.data[r * channels + c].abs());
            }
            let a_max = act_max[c];
            // A channel that never activates, or a dead weight column,
            // would drive the factor to 0 or infinity; leave it alone.
            if a_max <= SMOOTH_EPSILON || w_max <= SMOOTH_EPSILON {
                continue;
            }
            scales[c] =
                (a_max.powf(self.alpha) / w_max.powf(1.0 - self.alpha)).max(SMOOTH_EPSILON);
        }

        // Producer output channel c shrinks by 1/s_c...
        let mut new_producer = producer.clone();
        let p_cols = producer.cols();
        for c in 0..channels {
            for j in 0..p_cols {
                new_producer.data[c * p_cols + j] /= scales[c];
            }
        }

        // ...and the consumer's input column c grows by s_c.
        let mut new_consumer = consumer.clone();
        for r in 0..consumer.rows() {
            for c in 0..channels {
                new_consumer.data[r * channels + c] *= scales[c];
            }
        }

        Some((new_producer, new_consumer))
    }
}

impl Modifier for SmoothQuantModifier {
    fn name(&self) -> &'static str {
        "smooth_quant"
    }

    fn stages(&self) -> &'static [PipelineStage] {
        &[PipelineStage::PreCalibration]
    }

    fn bind(&mut self, graph: &ModuleGraph) -> Result<Vec<ResolutionWarning>> {
        let outcome = resolve_targets(self.name(), &self.selector, graph)?;
        self.targets = outcome
            .layers
            .into_iter()
            .filter(|path| graph.get(path).is_some_and(|n| n.is_weighted()))
            .collect();

        for path in &self.targets {
            if let Some(consumer) = graph.next_weighted(path) {
                self.consumers.insert(path.clone(), consumer.path.clone());
            }
        }
        Ok(outcome.warnings)
    }

    fn targets(&self) -> &[String] {
        &self.targets
    }

    fn calibration_stage(&self) -> Option<PipelineStage> {
        Some(PipelineStage::PreCalibration)
    }

    fn observed_layers(&self) -> Vec<String> {
        // Statistics are needed at the consumer's input, which is the
        // channel interface the smoothing factors act on.
        self.consumers.values().cloned().collect()
    }

    fn observe(&mut self, layer: &str, input: &[f32], _output: &[f32]) {
        let absmax = self
            .act_absmax
            .entry(layer.to_string())
            .or_insert_with(|| vec![0.0; input.len()]);
        for (running, &val) in absmax.iter_mut().zip(input) {
            let mag = val.abs();
            if mag > *running {
                *running = mag;
            }
        }
    }

    fn apply(
        &mut self,
        stage: PipelineStage,
        graph: &mut ModuleGraph,
        ctx: &mut StageContext<'_>,
    ) -> Result<()> {
        if stage != PipelineStage::PreCalibration {
            return Ok(());
        }

        for producer_path in &self.targets {
            let Some(consumer_path) = self.consumers.get(producer_path) else {
                ctx.report.note(format!(
                    "smooth_quant: no consumer layer found after '{producer_path}', skipping"
                ));
                continue;
            };

            let (Some(producer), Some(consumer)) = (
                graph.get(producer_path).and_then(|n| n.weight.clone()),
                graph.get(consumer_path).and_then(|n| n.weight.clone()),
            ) else {
                continue;
            };

            let Some(act_max) = self.act_absmax.get(consumer_path) else {
                ctx.report.note(format!(
                    "smooth_quant: no activation statistics for '{consumer_path}', skipping"
                ));
                continue;
            };

            match self.smooth_pair(&producer, &consumer, act_max) {
                Some((new_producer, new_consumer)) => {
                    // Both rewrites land together or not at all
                    graph.set_weight(producer_path, new_producer);
                    graph.set_weight(consumer_path, new_consumer);
                }
                None => {
                    ctx.report.note(format!(
                        "smooth_quant: channel mismatch between '{producer_path}' and \
                         '{consumer_path}', skipping"
                    ));
                }
            }
        }

        // Inert after the transform stage
        self.act_absmax.clear();
        Ok(())
    }
}
