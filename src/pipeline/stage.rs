//! Pipeline stage state machine

use serde::{Deserialize, Serialize};

/// Stages of a compression run.
///
/// The scheduler runs every modifier's work for a stage before advancing
/// (barrier semantics), so e.g. all SmoothQuant weight rewrites complete
/// before any GPTQ observation begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Recipe validated, targets resolved, per-layer state allocated
    Initialize,
    /// Weight-rewriting transforms that must precede calibration (SmoothQuant,
    /// magnitude pruning)
    PreCalibration,
    /// Calibration forward passes feeding observers and Hessian accumulators
    Calibration,
    /// Reconstruction, masking, and parameter finalization
    Finalize,
    /// Checkpoint serialization
    Compress,
    /// Terminal: run succeeded
    Complete,
    /// Terminal: run aborted
    Failed,
}

impl PipelineStage {
    /// The next stage in the pipeline. Terminal stages stay put.
    pub fn next(self) -> Self {
        match self {
            PipelineStage::Initialize => PipelineStage::PreCalibration,
            PipelineStage::PreCalibration => PipelineStage::Calibration,
            PipelineStage::Calibration => PipelineStage::Finalize,
            PipelineStage::Finalize => PipelineStage::Compress,
            PipelineStage::Compress => PipelineStage::Complete,
            PipelineStage::Complete | PipelineStage::Failed => self,
        }
    }

    /// Whether the pipeline can make no further progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut stage = PipelineStage::Initialize;
        let expected = [
            PipelineStage::PreCalibration,
            PipelineStage::Calibration,
            PipelineStage::Finalize,
            PipelineStage::Compress,
            PipelineStage::Complete,
        ];
        for want in expected {
            stage = stage.next();
            assert_eq!(stage, want);
        }
        // Terminal states do not advance
        assert_eq!(stage.next(), PipelineStage::Complete);
        assert_eq!(PipelineStage::Failed.next(), PipelineStage::Failed);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(PipelineStage::Complete.is_terminal());
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Calibration.is_terminal());
    }
}
