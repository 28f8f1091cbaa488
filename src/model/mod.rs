//! Model graph abstraction
//!
//! The pipeline never operates on a concrete framework model. It sees a
//! [`ModuleGraph`]: an ordered set of named layers with type tags, weight
//! accessors, and a forward pass that the calibration driver can tap.
//! Adapters for real model formats construct this graph from their own
//! representation.

mod graph;
mod layer;
mod tensor;

pub use graph::{ForwardError, ModuleGraph};
pub use layer::LayerNode;
pub use tensor::TensorData;
