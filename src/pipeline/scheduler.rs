//! Recipe scheduler
//!
//! Drives a recipe through the stage state machine with barrier semantics:
//! every participating modifier finishes a stage before any modifier
//! enters the next. Within a stage, modifiers act in recipe order, so the
//! recipe's total order is the only source of precedence.
//!
//! Stages that consume activations (PreCalibration for SmoothQuant,
//! Calibration for the Hessian engines) each run one full forward pass
//! over the calibration source, dispatching per-layer activations to the
//! modifiers that subscribed to them.

use std::collections::BTreeMap;

use crate::calibrate::{CalibrationSource, ForwardDriver};
use crate::error::Result;
use crate::model::ModuleGraph;
use crate::modifier::{CompressedArtifacts, Modifier, Recipe, StageContext};

use super::report::CompressionReport;
use super::stage::PipelineStage;

/// Orchestrates one compression run.
pub struct CompressionPipeline {
    modifiers: Vec<Box<dyn Modifier>>,
    stage: PipelineStage,
    report: CompressionReport,
    artifacts: CompressedArtifacts,
}

impl CompressionPipeline {
    /// Build a pipeline from a validated recipe.
    pub fn new(recipe: &Recipe) -> Result<Self> {
        Ok(Self {
            modifiers: recipe.build()?,
            stage: PipelineStage::Initialize,
            report: CompressionReport::default(),
            artifacts: CompressedArtifacts::default(),
        })
    }

    /// Current pipeline stage.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// The run report accumulated so far.
    pub fn report(&self) -> &CompressionReport {
        &self.report
    }

    /// Artifacts produced by the modifiers.
    pub fn artifacts(&self) -> &CompressedArtifacts {
        &self.artifacts
    }

    /// Consume the pipeline, yielding its report and artifacts.
    pub fn into_parts(self) -> (CompressionReport, CompressedArtifacts) {
        (self.report, self.artifacts)
    }

    /// Execute the full run: bind targets, run each stage to its barrier,
    /// mutate `graph` in place.
    ///
    /// On error the pipeline parks in [`PipelineStage::Failed`] and the
    /// error propagates; the report remains inspectable.
    pub fn run<S>(&mut self, graph: &mut ModuleGraph, source: &S) -> Result<()>
    where
        S: CalibrationSource + ?Sized,
    {
        match self.execute(graph, source) {
            Ok(()) => {
                self.stage = PipelineStage::Complete;
                Ok(())
            }
            Err(e) => {
                self.stage = PipelineStage::Failed;
                Err(e)
            }
        }
    }

    fn execute<S>(&mut self, graph: &mut ModuleGraph, source: &S) -> Result<()>
    where
        S: CalibrationSource + ?Sized,
    {
        self.stage = PipelineStage::Initialize;
        for modifier in &mut self.modifiers {
            let warnings = modifier.bind(graph)?;
            self.report.resolution_warnings.extend(warnings);
        }

        for stage in [
            PipelineStage::PreCalibration,
            PipelineStage::Calibration,
            PipelineStage::Finalize,
        ] {
            self.stage = stage;

            // Observation pass first: modifiers calibrating in this stage
            // see activations produced by the weights as previous stages
            // left them
            self.observe_stage(stage, graph, source)?;

            for modifier in &mut self.modifiers {
                if !modifier.stages().contains(&stage) {
                    continue;
                }
                let mut ctx = StageContext {
                    report: &mut self.report,
                    artifacts: &mut self.artifacts,
                };
                modifier.apply(stage, graph, &mut ctx)?;
            }
        }

        self.stage = PipelineStage::Compress;
        Ok(())
    }

    /// Run one forward pass over the source for the modifiers that
    /// calibrate in `stage`, dispatching each tapped activation to every
    /// subscriber in recipe order.
    fn observe_stage<S>(
        &mut self,
        stage: PipelineStage,
        graph: &ModuleGraph,
        source: &S,
    ) -> Result<()>
    where
        S: CalibrationSource + ?Sized,
    {
        // layer path -> indices of modifiers observing it
        let mut subscribers: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, modifier) in self.modifiers.iter().enumerate() {
            if modifier.calibration_stage() != Some(stage) {
                continue;
            }
            for layer in modifier.observed_layers() {
                subscribers.entry(layer).or_default().push(idx);
            }
        }
        if subscribers.is_empty() {
            return Ok(());
        }

        let mut driver = ForwardDriver::new();
        driver.subscribe_all(subscribers.keys().cloned());

        let modifiers = &mut self.modifiers;
        let processed = driver.run(graph, source, |_, layer, input, output| {
            if let Some(indices) = subscribers.get(layer) {
                for &idx in indices {
                    modifiers[idx].observe(layer, input, output);
                }
            }
        })?;
        self.report.samples_processed += processed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayerNode, ModuleGraph, TensorData};
    use crate::modifier::Recipe;

    fn two_layer_graph() -> ModuleGraph {
        ModuleGraph::new(vec![
            LayerNode::linear(
                "fc1",
                TensorData::new(vec![0.4, -0.2, 0.1, 0.3, 0.25, -0.15, 0.05, 0.2], vec![2, 4]),
            ),
            LayerNode::passthrough("act", "ReLU"),
            LayerNode::linear("fc2", TensorData::new(vec![0.5, -0.3, 0.2, 0.4], vec![2, 2])),
        ])
    }

    fn one_hot_samples(dim: usize) -> Vec<Vec<f32>> {
        (0..dim)
            .map(|i| {
                let mut s = vec![0.0; dim];
                s[i] = 1.0;
                s
            })
            .collect()
    }

    #[test]
    fn test_gptq_recipe_quantizes_targets() {
        let recipe = Recipe::from_json(
            r#"[{"gptq": {"scheme": "W8A16", "targets": ["Linear"]}}]"#,
        )
        .unwrap();
        let mut pipeline = CompressionPipeline::new(&recipe).unwrap();
        let mut graph = two_layer_graph();
        let samples = one_hot_samples(4);

        pipeline.run(&mut graph, &samples).unwrap();

        assert_eq!(pipeline.stage(), PipelineStage::Complete);
        assert!(pipeline.artifacts().tensors.contains_key("fc1"));
        assert!(pipeline.artifacts().tensors.contains_key("fc2"));
        assert_eq!(pipeline.report().samples_processed, 4);
        assert!(pipeline.report().layer_losses.contains_key("fc1"));
    }

    #[test]
    fn test_failed_forward_parks_in_failed_stage() {
        let recipe = Recipe::from_json(
            r#"[{"gptq": {"scheme": "W8A16", "targets": ["Linear"]}}]"#,
        )
        .unwrap();
        let mut pipeline = CompressionPipeline::new(&recipe).unwrap();
        let mut graph = two_layer_graph();
        // Wrong input width
        let samples = vec![vec![1.0, 0.0]];

        let err = pipeline.run(&mut graph, &samples).unwrap_err();
        assert_eq!(pipeline.stage(), PipelineStage::Failed);
        assert!(err.to_string().contains("fc1"));
    }

    #[test]
    fn test_unmatched_pattern_surfaces_as_warning() {
        let recipe = Recipe::from_json(
            r#"[{"gptq": {"scheme": "W8A16", "targets": ["Linear", "does_not_exist"]}}]"#,
        )
        .unwrap();
        let mut pipeline = CompressionPipeline::new(&recipe).unwrap();
        let mut graph = two_layer_graph();

        pipeline.run(&mut graph, &one_hot_samples(4)).unwrap();
        assert_eq!(pipeline.report().resolution_warnings.len(), 1);
        assert_eq!(pipeline.report().resolution_warnings[0].pattern, "does_not_exist");
    }

    #[test]
    fn test_prune_then_quantize_preserves_zeros() {
        let recipe = Recipe::from_json(
            r#"[
                {"magnitude": {"sparsity": 0.5, "targets": ["fc1"]}},
                {"gptq": {"scheme": "W8A16", "targets": ["fc1"]}}
            ]"#,
        )
        .unwrap();
        let mut pipeline = CompressionPipeline::new(&recipe).unwrap();
        let mut graph = two_layer_graph();

        pipeline.run(&mut graph, &one_hot_samples(4)).unwrap();

        let mask = &pipeline.artifacts().masks["fc1"];
        let weight = graph.get("fc1").unwrap().weight.as_ref().unwrap();
        for (i, &keep) in mask.keep.iter().enumerate() {
            if !keep {
                assert_eq!(weight.data[i], 0.0, "pruned element {i} resurrected");
            }
        }
    }

    #[test]
    fn test_empty_source_skips_observation_but_degrades() {
        let recipe = Recipe::from_json(
            r#"[{"gptq": {"scheme": "W8A16", "targets": ["fc1"]}}]"#,
        )
        .unwrap();
        let mut pipeline = CompressionPipeline::new(&recipe).unwrap();
        let mut graph = two_layer_graph();
        let samples: Vec<Vec<f32>> = Vec::new();

        pipeline.run(&mut graph, &samples).unwrap();
        // No calibration data: the layer still quantizes, via the fallback
        assert!(pipeline.report().is_degraded());
        assert!(pipeline.artifacts().tensors.contains_key("fc1"));
    }
}
