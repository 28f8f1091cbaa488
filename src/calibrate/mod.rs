//! Calibration forward driver
//!
//! Feeds calibration samples through the model while invoking subscribed
//! per-layer callbacks on input/output activations. Activations are
//! consumed and dropped after each sample; memory stays bounded to one
//! sample's worth regardless of dataset size.

mod driver;
#[cfg(test)]
mod tests;

pub use driver::{CalibrationSource, ForwardDriver};
