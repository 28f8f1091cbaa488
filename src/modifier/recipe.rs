//! Declarative recipes
//!
//! A recipe is an ordered list of modifier configurations. Order is a
//! total order defining application precedence: modifiers are not
//! commutative (SmoothQuant before GPTQ changes GPTQ's input
//! distribution). Unknown fields are rejected rather than silently
//! ignored, so a misspelled hyperparameter fails before calibration
//! starts.

use serde::{Deserialize, Serialize};

use crate::error::{CompressError, Result};
use crate::scheme::QuantScheme;
use crate::target::TargetSelector;

use super::mask::SparsityPattern;
use super::{
    GptqModifier, MagnitudeModifier, Modifier, SmoothQuantModifier, SparseGptModifier,
};

fn default_alpha() -> f32 {
    0.5
}

fn default_block_size() -> usize {
    128
}

fn default_damp_percent() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

/// One modifier entry in a recipe.
///
/// Serialized externally tagged, e.g.
/// `{"gptq": {"scheme": "W4A16", "targets": ["Linear"]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ModifierConfig {
    /// Activation-smoothing rebalancing
    SmoothQuant {
        /// Smoothing strength in [0, 1]
        #[serde(default = "default_alpha")]
        alpha: f32,
        /// Include patterns
        targets: Vec<String>,
        /// Exclude patterns
        #[serde(default)]
        ignore: Vec<String>,
    },

    /// Hessian-guided weight quantization
    Gptq {
        /// Scheme preset name (W4A16, W4A8, W8A8, W8A16)
        scheme: String,
        /// Group-size override for grouped weight quantization
        #[serde(default)]
        group_size: Option<usize>,
        /// Columns reconstructed per block
        #[serde(default = "default_block_size")]
        block_size: usize,
        /// Diagonal damping as a fraction of mean(diag(H))
        #[serde(default = "default_damp_percent")]
        damp_percent: f64,
        /// Include patterns
        targets: Vec<String>,
        /// Exclude patterns
        #[serde(default)]
        ignore: Vec<String>,
    },

    /// Hessian-guided pruning with compensation
    SparseGpt {
        /// Target sparsity ratio in [0, 1)
        sparsity: f32,
        /// Sparsity pattern
        #[serde(default)]
        pattern: SparsityPattern,
        /// Whether surviving weights absorb the pruned mass
        #[serde(default = "default_true")]
        compensate: bool,
        /// Diagonal damping as a fraction of mean(diag(H))
        #[serde(default = "default_damp_percent")]
        damp_percent: f64,
        /// Include patterns
        targets: Vec<String>,
        /// Exclude patterns
        #[serde(default)]
        ignore: Vec<String>,
    },

    /// Calibration-free magnitude pruning
    Magnitude {
        /// Target sparsity ratio in [0, 1)
        sparsity: f32,
        /// Sparsity pattern
        #[serde(default)]
        pattern: SparsityPattern,
        /// Include patterns
        targets: Vec<String>,
        /// Exclude patterns
        #[serde(default)]
        ignore: Vec<String>,
    },
}

impl ModifierConfig {
    /// Validate hyperparameters. Fails before calibration starts.
    pub fn validate(&self) -> Result<()> {
        match self {
            ModifierConfig::SmoothQuant { alpha, .. } => {
                if !(0.0..=1.0).contains(alpha) {
                    return Err(CompressError::InvalidSmoothingStrength(*alpha));
                }
            }
            ModifierConfig::Gptq { scheme, group_size, block_size, damp_percent, .. } => {
                QuantScheme::parse(scheme, *group_size)?;
                if *block_size == 0 {
                    return Err(CompressError::InvalidBlockSize(*block_size));
                }
                if *damp_percent <= 0.0 {
                    return Err(CompressError::InvalidDampingFactor(*damp_percent as f32));
                }
            }
            ModifierConfig::SparseGpt { sparsity, pattern, damp_percent, .. } => {
                if !(0.0..1.0).contains(sparsity) {
                    return Err(CompressError::InvalidSparsityRatio(*sparsity));
                }
                pattern.validate()?;
                if *damp_percent <= 0.0 {
                    return Err(CompressError::InvalidDampingFactor(*damp_percent as f32));
                }
            }
            ModifierConfig::Magnitude { sparsity, pattern, .. } => {
                if !(0.0..1.0).contains(sparsity) {
                    return Err(CompressError::InvalidSparsityRatio(*sparsity));
                }
                pattern.validate()?;
            }
        }
        Ok(())
    }

    fn selector(&self) -> TargetSelector {
        let (targets, ignore) = match self {
            ModifierConfig::SmoothQuant { targets, ignore, .. }
            | ModifierConfig::Gptq { targets, ignore, .. }
            | ModifierConfig::SparseGpt { targets, ignore, .. }
            | ModifierConfig::Magnitude { targets, ignore, .. } => (targets, ignore),
        };
        TargetSelector { targets: targets.clone(), ignore: ignore.clone() }
    }

    /// Instantiate the configured modifier.
    pub fn build(&self) -> Result<Box<dyn Modifier>> {
        self.validate()?;
        let selector = self.selector();
        Ok(match self {
            ModifierConfig::SmoothQuant { alpha, .. } => {
                Box::new(SmoothQuantModifier::new(*alpha, selector))
            }
            ModifierConfig::Gptq { scheme, group_size, block_size, damp_percent, .. } => {
                let scheme = QuantScheme::parse(scheme, *group_size)?;
                Box::new(GptqModifier::new(scheme, *block_size, *damp_percent, selector))
            }
            ModifierConfig::SparseGpt { sparsity, pattern, compensate, damp_percent, .. } => {
                Box::new(SparseGptModifier::new(
                    *sparsity,
                    *pattern,
                    *compensate,
                    *damp_percent,
                    selector,
                ))
            }
            ModifierConfig::Magnitude { sparsity, pattern, .. } => {
                Box::new(MagnitudeModifier::new(*sparsity, *pattern, selector))
            }
        })
    }
}

/// An ordered sequence of modifier configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipe {
    /// Modifier entries in application order
    pub modifiers: Vec<ModifierConfig>,
}

impl Recipe {
    /// Build a recipe from configurations.
    pub fn new(modifiers: Vec<ModifierConfig>) -> Self {
        Self { modifiers }
    }

    /// Parse a recipe from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::RecipeParse`] for malformed input or
    /// unknown fields, [`CompressError::EmptyRecipe`] for an empty list,
    /// and configuration errors from per-modifier validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let recipe: Recipe = serde_json::from_str(json)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Validate every entry.
    pub fn validate(&self) -> Result<()> {
        if self.modifiers.is_empty() {
            return Err(CompressError::EmptyRecipe);
        }
        for config in &self.modifiers {
            config.validate()?;
        }
        Ok(())
    }

    /// Instantiate all modifiers, in recipe order.
    pub fn build(&self) -> Result<Vec<Box<dyn Modifier>>> {
        self.validate()?;
        self.modifiers.iter().map(ModifierConfig::build).collect()
    }
}
