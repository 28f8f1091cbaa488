//! Selector specification and pattern matching

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CompressError, Result};

/// A modifier's layer selector: include patterns plus exclude patterns.
///
/// A pattern matches a layer by
/// - exact layer type name (`"Linear"`),
/// - `re:`-prefixed regex over the module path (`"re:.*q_proj$"`),
/// - `*` glob over the module path (`"model.layers.*.mlp.down_proj"`), or
/// - exact module path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelector {
    /// Include patterns
    pub targets: Vec<String>,
    /// Exclude patterns; always take precedence over includes
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl TargetSelector {
    /// Select all layers of one type.
    pub fn by_kind(kind: impl Into<String>) -> Self {
        Self { targets: vec![kind.into()], ignore: Vec::new() }
    }
}

/// A single compiled selector pattern.
#[derive(Debug)]
pub(crate) enum Pattern {
    Literal(String),
    PathRegex(Regex),
}

impl Pattern {
    /// Compile a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::InvalidSelector`] for a malformed regex.
    pub(crate) fn compile(pattern: &str) -> Result<Self> {
        if let Some(expr) = pattern.strip_prefix("re:") {
            let re = anchored(expr, pattern)?;
            return Ok(Pattern::PathRegex(re));
        }
        if pattern.contains('*') {
            let expr = regex::escape(pattern).replace("\\*", ".*");
            let re = anchored(&expr, pattern)?;
            return Ok(Pattern::PathRegex(re));
        }
        Ok(Pattern::Literal(pattern.to_string()))
    }

    /// Whether the pattern matches a layer with the given path and kind.
    pub(crate) fn matches(&self, path: &str, kind: &str) -> bool {
        match self {
            Pattern::Literal(lit) => lit == path || lit == kind,
            Pattern::PathRegex(re) => re.is_match(path),
        }
    }
}

fn anchored(expr: &str, original: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{expr})$")).map_err(|e| CompressError::InvalidSelector {
        pattern: original.to_string(),
        reason: e.to_string(),
    })
}
