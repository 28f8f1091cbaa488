//! Statistics collectors for calibration
//!
//! Two observer families feed the algorithm engines:
//! - [`MinMaxObserver`] tracks running per-group ranges and finalizes into
//!   quantization parameters.
//! - [`HessianAccumulator`] maintains the outer-product sum of observed
//!   input activations (the Hessian proxy) that GPTQ and SparseGPT invert
//!   during reconstruction.

mod hessian;
mod minmax;
#[cfg(test)]
mod tests;

pub use hessian::HessianAccumulator;
pub(crate) use hessian::damped_inverse_cholesky;
pub use minmax::MinMaxObserver;
