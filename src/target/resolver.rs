//! Selector resolution against a module graph

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::ModuleGraph;

use super::selector::{Pattern, TargetSelector};

/// Warning for an include pattern that matched zero layers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionWarning {
    /// Name of the modifier whose selector produced the warning
    pub modifier: String,
    /// The pattern that matched nothing
    pub pattern: String,
}

impl std::fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: target pattern '{}' matched no layers", self.modifier, self.pattern)
    }
}

/// Result of resolving a selector: the owned layers plus any warnings.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    /// Layer paths in graph traversal order
    pub layers: Vec<String>,
    /// Include patterns that matched nothing
    pub warnings: Vec<ResolutionWarning>,
}

/// Resolve a selector against the graph.
///
/// A layer is included iff at least one include pattern matches it, then
/// excluded if any ignore pattern matches. Output order is graph traversal
/// order, so repeated runs on the same model produce identical layer
/// sequences.
///
/// # Errors
///
/// Returns [`CompressError::InvalidSelector`](crate::CompressError::InvalidSelector)
/// for a malformed pattern.
pub fn resolve_targets(
    modifier: &str,
    selector: &TargetSelector,
    graph: &ModuleGraph,
) -> Result<ResolutionOutcome> {
    let includes: Vec<Pattern> =
        selector.targets.iter().map(|p| Pattern::compile(p)).collect::<Result<_>>()?;
    let excludes: Vec<Pattern> =
        selector.ignore.iter().map(|p| Pattern::compile(p)).collect::<Result<_>>()?;

    let mut hit_counts = vec![0usize; includes.len()];
    let mut layers = Vec::new();

    for node in graph.layers() {
        let mut included = false;
        for (pattern, hits) in includes.iter().zip(hit_counts.iter_mut()) {
            if pattern.matches(&node.path, &node.kind) {
                *hits += 1;
                included = true;
            }
        }
        if !included {
            continue;
        }
        // Exclude always wins, including over pattern matches
        if excludes.iter().any(|p| p.matches(&node.path, &node.kind)) {
            continue;
        }
        layers.push(node.path.clone());
    }

    let warnings = selector
        .targets
        .iter()
        .zip(&hit_counts)
        .filter(|(_, &hits)| hits == 0)
        .map(|(pattern, _)| ResolutionWarning {
            modifier: modifier.to_string(),
            pattern: pattern.clone(),
        })
        .collect();

    Ok(ResolutionOutcome { layers, warnings })
}
