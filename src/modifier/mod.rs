//! Modifiers: configured algorithm steps in a recipe
//!
//! A modifier is constructed from a recipe entry, bound to resolved target
//! layers at pipeline start, executes one or more pipeline stages, and
//! becomes inert after finalize. The engines:
//!
//! - [`SmoothQuantModifier`]: migrates quantization difficulty from
//!   activations into weights (Xiao et al., 2022, arXiv:2211.10438)
//! - [`GptqModifier`]: Hessian-guided layer-wise weight reconstruction
//!   (Frantar et al., 2022, arXiv:2210.17323)
//! - [`SparseGptModifier`]: Hessian-guided pruning with compensation
//!   (Frantar & Alistarh, 2023, arXiv:2301.00774)
//! - [`MagnitudeModifier`]: calibration-free magnitude pruning
//!   (Han et al., 2015)

pub mod gptq;
mod magnitude;
mod mask;
mod recipe;
mod smoothquant;
mod sparsegpt;

pub use gptq::GptqModifier;
pub use magnitude::MagnitudeModifier;
pub use mask::{SparsityMask, SparsityPattern};
pub use recipe::{ModifierConfig, Recipe};
pub use smoothquant::SmoothQuantModifier;
pub use sparsegpt::SparseGptModifier;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::ModuleGraph;
use crate::pipeline::{CompressionReport, PipelineStage};
use crate::scheme::QuantizedTensor;
use crate::target::ResolutionWarning;

/// Artifacts accumulated across modifiers, consumed by the checkpoint
/// writer.
///
/// Masks registered here are frozen: later modifiers must preserve their
/// zeros (a masked-then-quantized weight still quantizes to exactly zero).
#[derive(Clone, Debug, Default)]
pub struct CompressedArtifacts {
    /// Quantized tensors keyed by layer path
    pub tensors: BTreeMap<String, QuantizedTensor>,
    /// Sparsity masks keyed by layer path
    pub masks: BTreeMap<String, SparsityMask>,
}

/// Mutable pipeline state handed to a modifier's stage actions.
pub struct StageContext<'a> {
    /// Run report for warnings, degradations, and per-layer metrics
    pub report: &'a mut CompressionReport,
    /// Artifact store shared across modifiers
    pub artifacts: &'a mut CompressedArtifacts,
}

/// One configured algorithm step in a recipe.
pub trait Modifier {
    /// Algorithm name, used in reports and the recipe echo.
    fn name(&self) -> &'static str;

    /// Stages this modifier acts in.
    fn stages(&self) -> &'static [PipelineStage];

    /// Resolve targets against the graph and allocate per-layer state.
    ///
    /// Called once, at pipeline start. Returns warnings for selector
    /// patterns that matched nothing.
    fn bind(&mut self, graph: &ModuleGraph) -> Result<Vec<ResolutionWarning>>;

    /// Resolved target layer paths, in graph traversal order.
    fn targets(&self) -> &[String];

    /// The stage during which this modifier consumes calibration
    /// activations, if any.
    fn calibration_stage(&self) -> Option<PipelineStage> {
        None
    }

    /// Layers whose activations this modifier must see during its
    /// calibration stage. Defaults to the resolved targets.
    fn observed_layers(&self) -> Vec<String> {
        self.targets().to_vec()
    }

    /// Consume one sample's activations for an observed layer.
    ///
    /// Invoked by the scheduler exactly once per (layer, sample), in
    /// sample order.
    fn observe(&mut self, _layer: &str, _input: &[f32], _output: &[f32]) {}

    /// Execute this modifier's action for a stage it participates in.
    ///
    /// Weight mutations are atomic per layer: the new tensor is fully
    /// computed before being swapped in.
    fn apply(
        &mut self,
        stage: PipelineStage,
        graph: &mut ModuleGraph,
        ctx: &mut StageContext<'_>,
    ) -> Result<()>;
}
