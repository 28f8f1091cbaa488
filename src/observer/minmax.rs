//! Running min/max observer

use crate::scheme::{Granularity, QuantArgs, QuantParams};

/// Incremental min/max statistics over a fixed tensor layout.
///
/// `update` folds one tensor's worth of values into per-group running
/// ranges; `finalize` derives scales (and zero-points for asymmetric
/// schemes) mapped onto the integer range of the configured bit width.
#[derive(Clone, Debug)]
pub struct MinMaxObserver {
    args: QuantArgs,
    granularity: Granularity,
    shape: Vec<usize>,
    mins: Vec<f32>,
    maxs: Vec<f32>,
    batches: usize,
}

impl MinMaxObserver {
    /// Create an observer for tensors of the given shape.
    ///
    /// The effective granularity is resolved here: a group size that does
    /// not divide the channel dimension falls back to per-channel.
    pub fn new(args: QuantArgs, shape: &[usize]) -> Self {
        let (granularity, _) = args.effective_granularity(shape);
        let groups = granularity.num_groups(shape);
        Self {
            args,
            granularity,
            shape: shape.to_vec(),
            mins: vec![f32::INFINITY; groups],
            maxs: vec![f32::NEG_INFINITY; groups],
            batches: 0,
        }
    }

    /// Whether the configured group size fell back to per-channel.
    pub fn fell_back_to_per_channel(&self) -> bool {
        matches!(self.args.granularity, Granularity::PerGroup { .. })
            && self.granularity == Granularity::PerChannel
    }

    /// Fold one tensor's values into the running ranges.
    pub fn update(&mut self, values: &[f32]) {
        for (i, &val) in values.iter().enumerate() {
            let g = self.granularity.group_index(i, &self.shape);
            if val < self.mins[g] {
                self.mins[g] = val;
            }
            if val > self.maxs[g] {
                self.maxs[g] = val;
            }
        }
        self.batches += 1;
    }

    /// Number of update batches observed.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Derive quantization parameters from the observed ranges.
    ///
    /// Groups that never saw data collapse to the (0, 0) range, which the
    /// parameter derivation clamps to a positive epsilon scale.
    pub fn finalize(&self) -> QuantParams {
        let ranges: Vec<(f32, f32)> = self
            .mins
            .iter()
            .zip(&self.maxs)
            .map(|(&min, &max)| {
                if min.is_finite() && max.is_finite() {
                    (min, max)
                } else {
                    (0.0, 0.0)
                }
            })
            .collect();
        QuantParams::from_ranges(&ranges, &self.args, self.granularity)
    }
}
