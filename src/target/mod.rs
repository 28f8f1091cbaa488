//! Target resolution
//!
//! Maps a modifier's `targets`/`ignore` selectors against the live module
//! graph into the concrete, ordered set of layers the modifier owns.
//! Exclude patterns always win; include patterns matching zero layers are
//! reported as warnings, not errors, since recipes are reused across model
//! variants.

mod resolver;
mod selector;

pub use resolver::{resolve_targets, ResolutionOutcome, ResolutionWarning};
pub use selector::TargetSelector;
