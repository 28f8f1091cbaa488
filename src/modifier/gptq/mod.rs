//! GPTQ weight quantization
//!
//! One-shot Hessian-guided quantization (Frantar et al., 2022). During
//! calibration each target layer accumulates an input-covariance Hessian
//! proxy from its calibration inputs; at finalization the weight is
//! reconstructed column by column against the damped inverse Cholesky
//! factor of that proxy. Layers whose proxy stays singular even after
//! damping fall back to direct min/max quantization and are recorded as
//! degradations rather than failing the run.
//!
//! Zeros frozen by an earlier pruning pass are preserved: masked elements
//! are pinned to the zero level so they dequantize to exactly zero. When
//! no explicit mask was registered but a weight arrives at least 40%
//! sparse, its zero pattern is treated as intentional and preserved too.

mod reconstruct;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::ModuleGraph;
use crate::observer::HessianAccumulator;
use crate::pipeline::PipelineStage;
use crate::scheme::QuantScheme;
use crate::target::{resolve_targets, ResolutionWarning, TargetSelector};

use super::{Modifier, StageContext};
use reconstruct::{fallback_quantize, reconstruct_layer};

/// Weights at or above this sparsity have their zero pattern preserved
/// even without an explicit mask.
const SPARSITY_THRESHOLD: f32 = 0.4;

/// Hessian-guided quantization modifier.
pub struct GptqModifier {
    scheme: QuantScheme,
    block_size: usize,
    damp_percent: f64,
    selector: TargetSelector,
    targets: Vec<String>,
    hessians: BTreeMap<String, HessianAccumulator>,
}

impl GptqModifier {
    /// Create a modifier for the given scheme.
    pub fn new(
        scheme: QuantScheme,
        block_size: usize,
        damp_percent: f64,
        selector: TargetSelector,
    ) -> Self {
        Self {
            scheme,
            block_size,
            damp_percent,
            selector,
            targets: Vec::new(),
            hessians: BTreeMap::new(),
        }
    }

    /// The scheme this modifier quantizes to.
    pub fn scheme(&self) -> &QuantScheme {
        &self.scheme
    }
}

impl Modifier for GptqModifier {
    fn name(&self) -> &'static str {
        "gptq"
    }

    fn stages(&self) -> &'static [PipelineStage] {
        &[PipelineStage::Calibration, PipelineStage::Finalize]
    }

    fn bind(&mut self, graph: &ModuleGraph) -> Result<Vec<ResolutionWarning>> {
        let outcome = resolve_targets(self.name(), &self.selector, graph)?;
        self.targets = outcome
            .layers
            .into_iter()
            .filter(|path| graph.get(path).is_some_and(|n| n.is_weighted()))
            .collect();
        for path in &self.targets {
            if let Some(weight) = graph.get(path).and_then(|n| n.weight.as_ref()) {
                self.hessians.insert(path.clone(), HessianAccumulator::new(weight.cols()));
            }
        }
        Ok(outcome.warnings)
    }

    fn targets(&self) -> &[String] {
        &self.targets
    }

    fn calibration_stage(&self) -> Option<PipelineStage> {
        Some(PipelineStage::Calibration)
    }

    fn observe(&mut self, layer: &str, input: &[f32], _output: &[f32]) {
        if let Some(acc) = self.hessians.get_mut(layer) {
            acc.update(input);
        }
    }

    fn apply(
        &mut self,
        stage: PipelineStage,
        graph: &mut ModuleGraph,
        ctx: &mut StageContext<'_>,
    ) -> Result<()> {
        if stage != PipelineStage::Finalize {
            return Ok(());
        }

        for path in &self.targets {
            let Some(weight) = graph.get(path).and_then(|n| n.weight.clone()) else {
                continue;
            };

            let (_, fell_back) = self.scheme.weights.effective_granularity(&weight.shape);
            if fell_back {
                ctx.report.note(format!(
                    "gptq: group size does not divide '{path}' channel width, \
                     falling back to per-channel"
                ));
            }

            // Masks frozen by an earlier pruning pass win over the
            // implicit sparsity heuristic
            let keep: Option<Vec<bool>> = match ctx.artifacts.masks.get(path) {
                Some(mask) => Some(mask.keep.clone()),
                None if weight.sparsity() >= SPARSITY_THRESHOLD => {
                    Some(weight.data.iter().map(|&v| v != 0.0).collect())
                }
                None => None,
            };

            let reconstruction = self
                .hessians
                .get(path)
                .filter(|acc| acc.samples() > 0)
                .and_then(|acc| {
                    reconstruct_layer(
                        &weight,
                        acc.matrix(),
                        &self.scheme.weights,
                        self.block_size,
                        self.damp_percent,
                        keep.as_deref(),
                    )
                });

            let reconstruction = match reconstruction {
                Some(r) => r,
                None => {
                    ctx.report.record_degradation(
                        path,
                        self.name(),
                        "hessian proxy singular or no calibration data",
                        "direct min/max quantization",
                    );
                    fallback_quantize(&weight, &self.scheme.weights, keep.as_deref())
                }
            };

            ctx.report.layer_losses.insert(path.clone(), reconstruction.squared_error);
            ctx.artifacts.tensors.insert(path.clone(), reconstruction.tensor);
            graph.set_weight(path, reconstruction.dequantized);
        }

        self.hessians.clear();
        Ok(())
    }
}
