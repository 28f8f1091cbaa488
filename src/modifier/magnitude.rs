//! Magnitude pruning
//!
//! Calibration-free baseline: saliency is plain `|w|`, so the smallest
//! weights prune first. Runs before calibration, which means masks frozen
//! here are visible to every Hessian-guided modifier that follows.

use crate::error::Result;
use crate::model::{ModuleGraph, TensorData};
use crate::pipeline::PipelineStage;
use crate::target::{resolve_targets, ResolutionWarning, TargetSelector};

use super::mask::{structured_nm_mask, unstructured_mask, SparsityMask, SparsityPattern};
use super::{Modifier, StageContext};

/// Magnitude pruning modifier.
pub struct MagnitudeModifier {
    sparsity: f32,
    pattern: SparsityPattern,
    selector: TargetSelector,
    targets: Vec<String>,
}

impl MagnitudeModifier {
    /// Create a modifier targeting the given sparsity.
    pub fn new(sparsity: f32, pattern: SparsityPattern, selector: TargetSelector) -> Self {
        Self { sparsity, pattern, selector, targets: Vec::new() }
    }
}

impl Modifier for MagnitudeModifier {
    fn name(&self) -> &'static str {
        "magnitude"
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
        Ok(outcome.warnings)
    }

    fn targets(&self) -> &[String] {
        &self.targets
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

        for path in &self.targets {
            let Some(weight) = graph.get(path).and_then(|n| n.weight.clone()) else {
                continue;
            };

            let saliency: Vec<f64> =
                weight.data.iter().map(|&v| f64::from(v.abs())).collect();
            let keep = match self.pattern {
                SparsityPattern::Unstructured => unstructured_mask(&saliency, self.sparsity),
                SparsityPattern::NM { n, m } => {
                    structured_nm_mask(&saliency, &weight.shape, n, m)
                }
            };

            let data = weight
                .data
                .iter()
                .zip(&keep)
                .map(|(&v, &k)| if k { v } else { 0.0 })
                .collect();
            let pruned = TensorData::new(data, weight.shape.clone());

            let mask = SparsityMask { keep, shape: weight.shape.clone() };
            ctx.report.layer_sparsity.insert(path.clone(), mask.sparsity());
            ctx.artifacts.masks.insert(path.clone(), mask);
            graph.set_weight(path, pruned);
        }

        Ok(())
    }
}
