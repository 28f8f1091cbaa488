//! Compression run reporting
//!
//! Warning-class conditions and locally recovered degradations are never
//! silently dropped: they accumulate here so a human can audit the quality
//! of a finished run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::target::ResolutionWarning;

/// A locally recovered numerical failure.
///
/// The run continued with a simpler estimator for the affected tensor;
/// quality may be degraded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    /// Layer whose tensor degraded
    pub layer: String,
    /// Modifier that hit the failure
    pub modifier: String,
    /// What failed
    pub reason: String,
    /// The estimator used instead
    pub fallback: String,
}

/// Aggregated outcome of one compression run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompressionReport {
    /// Selector patterns that matched no layers
    pub resolution_warnings: Vec<ResolutionWarning>,
    /// Free-form warnings (missing consumer pairs, group-size fallbacks)
    pub notes: Vec<String>,
    /// Locally recovered numerical failures
    pub degradations: Vec<Degradation>,
    /// Cumulative reconstruction loss per layer
    pub layer_losses: BTreeMap<String, f64>,
    /// Achieved sparsity per pruned layer
    pub layer_sparsity: BTreeMap<String, f32>,
    /// Calibration samples processed per stage pass
    pub samples_processed: usize,
}

impl CompressionReport {
    /// Record a recovered numerical failure.
    pub fn record_degradation(
        &mut self,
        layer: impl Into<String>,
        modifier: impl Into<String>,
        reason: impl Into<String>,
        fallback: impl Into<String>,
    ) {
        self.degradations.push(Degradation {
            layer: layer.into(),
            modifier: modifier.into(),
            reason: reason.into(),
            fallback: fallback.into(),
        });
    }

    /// Record a free-form warning.
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    /// Whether any tensor fell back to a degraded estimator.
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}
