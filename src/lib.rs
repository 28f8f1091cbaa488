//! comprimir: post-training model compression
//!
//! Recipe-driven quantization and sparsification of trained models.
//! A declarative recipe names the algorithms to run, their
//! hyperparameters, and the layers they target; the pipeline executes
//! the recipe stage by stage over a calibration dataset and serializes
//! the compressed result into a digest-verified checkpoint.
//!
//! ```
//! use comprimir::modifier::Recipe;
//! use comprimir::model::{LayerNode, ModuleGraph, TensorData};
//! use comprimir::pipeline::CompressionPipeline;
//!
//! let recipe = Recipe::from_json(
//!     r#"[{"gptq": {"scheme": "W8A16", "targets": ["Linear"]}}]"#,
//! )?;
//! let mut graph = ModuleGraph::new(vec![LayerNode::linear(
//!     "fc1",
//!     TensorData::new(vec![0.4, -0.2, 0.1, 0.3], vec![2, 2]),
//! )]);
//! let samples = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
//!
//! let mut pipeline = CompressionPipeline::new(&recipe)?;
//! pipeline.run(&mut graph, &samples)?;
//! assert!(pipeline.artifacts().tensors.contains_key("fc1"));
//! # Ok::<(), comprimir::CompressError>(())
//! ```
//!
//! Algorithms: SmoothQuant (activation-difficulty migration), GPTQ
//! (Hessian-guided weight quantization), SparseGPT (Hessian-guided
//! pruning with compensation), and magnitude pruning.

pub mod calibrate;
pub mod checkpoint;
pub mod error;
pub mod model;
pub mod modifier;
pub mod observer;
pub mod pipeline;
pub mod scheme;
pub mod target;

pub use error::{CompressError, Result};
