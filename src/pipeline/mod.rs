//! Compression pipeline: stages, scheduling, and run reporting
//!
//! A run walks the stage state machine with barrier semantics, executing
//! every modifier's work for a stage before advancing. Modifier precedence
//! within a stage is recipe order.

mod report;
mod scheduler;
mod stage;

pub use report::{CompressionReport, Degradation};
pub use scheduler::CompressionPipeline;
pub use stage::PipelineStage;
