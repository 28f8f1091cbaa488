//! SparseGPT: Hessian-guided one-shot pruning
//!
//! Scores each weight element by `(w / U[c,c])²`, where `U` is the upper
//! Cholesky factor of the damped inverse Hessian proxy, so a large weight
//! on a low-curvature input column prunes before a small weight on a
//! high-curvature one (Frantar & Alistarh, 2023). With compensation
//! enabled, each pruned element's mass is redistributed into surviving
//! later columns of the same row via the inverse-Hessian correction rows,
//! recovering most of the accuracy a plain mask would lose.
//!
//! If a layer's damped Hessian proxy is singular, saliency falls back to
//! plain magnitude and no compensation runs; the layer is recorded as a
//! degradation.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::Result;
use crate::model::{ModuleGraph, TensorData};
use crate::observer::{damped_inverse_cholesky, HessianAccumulator};
use crate::pipeline::PipelineStage;
use crate::target::{resolve_targets, ResolutionWarning, TargetSelector};

use super::mask::{structured_nm_mask, unstructured_mask, SparsityMask, SparsityPattern};
use super::{Modifier, StageContext};

/// Hessian-guided pruning modifier.
pub struct SparseGptModifier {
    sparsity: f32,
    pattern: SparsityPattern,
    compensate: bool,
    damp_percent: f64,
    selector: TargetSelector,
    targets: Vec<String>,
    hessians: BTreeMap<String, HessianAccumulator>,
}

impl SparseGptModifier {
    /// Create a modifier targeting the given sparsity.
    pub fn new(
        sparsity: f32,
        pattern: SparsityPattern,
        compensate: bool,
        damp_percent: f64,
        selector: TargetSelector,
    ) -> Self {
        Self {
            sparsity,
            pattern,
            compensate,
            damp_percent,
            selector,
            targets: Vec::new(),
            hessians: BTreeMap::new(),
        }
    }

    fn build_mask(&self, saliency: &[f64], shape: &[usize]) -> Vec<bool> {
        match self.pattern {
            SparsityPattern::Unstructured => unstructured_mask(saliency, self.sparsity),
            SparsityPattern::NM { n, m } => structured_nm_mask(saliency, shape, n, m),
        }
    }
}

/// Zero the masked elements of `weight`, folding each pruned element's
/// mass into surviving later columns of its row.
///
/// `err = w / U[c,c]` is the normalized pruning error; surviving columns
/// `k > c` absorb `err * U[c,k]`, the same correction row the GPTQ sweep
/// uses. Pruned later columns are skipped so the mask stays exact.
fn prune_with_compensation(weight: &TensorData, u: &Array2<f64>, keep: &[bool]) -> TensorData {
    let rows = weight.rows();
    let cols = weight.cols();

    let mut w: Vec<f64> = weight.data.iter().map(|&v| f64::from(v)).collect();
    for c in 0..cols {
        let d = u[[c, c]];
        for r in 0..rows {
            let flat = r * cols + c;
            if keep[flat] {
                continue;
            }
            let err = w[flat] / d;
            w[flat] = 0.0;
            for k in c + 1..cols {
                let target = r * cols + k;
                if keep[target] {
                    w[target] -= err * u[[c, k]];
                }
            }
        }
    }

    TensorData::new(w.into_iter().map(|v| v as f32).collect(), weight.shape.clone())
}

/// Zero the masked elements without redistribution.
fn prune_plain(weight: &TensorData, keep: &[bool]) -> TensorData {
    let data = weight
        .data
        .iter()
        .zip(keep)
        .map(|(&v, &k)| if k { v } else { 0.0 })
        .collect();
    TensorData::new(data, weight.shape.clone())
}

impl Modifier for SparseGptModifier {
    fn name(&self) -> &'static str {
        "sparse_gpt"
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
            let rows = weight.rows();
            let cols = weight.cols();

            let u = self
                .hessians
                .get(path)
                .filter(|acc| acc.samples() > 0)
                .and_then(|acc| damped_inverse_cholesky(acc.matrix(), self.damp_percent));

            let (saliency, u) = match u {
                Some(u) => {
                    let mut saliency = vec![0.0f64; weight.len()];
                    for r in 0..rows {
                        for c in 0..cols {
                            let ratio = f64::from(weight.data[r * cols + c]) / u[[c, c]];
                            saliency[r * cols + c] = ratio * ratio;
                        }
                    }
                    (saliency, Some(u))
                }
                None => {
                    ctx.report.record_degradation(
                        path,
                        self.name(),
                        "hessian proxy singular or no calibration data",
                        "magnitude saliency without compensation",
                    );
                    let saliency = weight
                        .data
                        .iter()
                        .map(|&v| f64::from(v.abs()))
                        .collect();
                    (saliency, None)
                }
            };

            let keep = self.build_mask(&saliency, &weight.shape);
            let pruned = match (&u, self.compensate) {
                (Some(u), true) => prune_with_compensation(&weight, u, &keep),
                _ => prune_plain(&weight, &keep),
            };

            let mask = SparsityMask { keep, shape: weight.shape.clone() };
            ctx.report.layer_sparsity.insert(path.clone(), mask.sparsity());
            ctx.artifacts.masks.insert(path.clone(), mask);
            graph.set_weight(path, pruned);
        }

        self.hessians.clear();
        Ok(())
    }
}
