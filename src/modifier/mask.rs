//! Sparsity masks and pattern selection

use serde::{Deserialize, Serialize};

use crate::error::{CompressError, Result};

/// Sparsity pattern selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SparsityPattern {
    /// Unstructured sparsity - any weight can be pruned.
    #[default]
    Unstructured,

    /// N:M structured sparsity (e.g., 2:4 for sparse tensor cores):
    /// exactly N of every M contiguous weights per row are zeroed.
    #[serde(rename = "nm")]
    NM {
        /// Number of elements zeroed per group
        n: usize,
        /// Group size
        m: usize,
    },
}

impl SparsityPattern {
    /// 2:4 pattern.
    pub fn nm_2_4() -> Self {
        SparsityPattern::NM { n: 2, m: 4 }
    }

    /// Validate pattern parameters.
    pub fn validate(&self) -> Result<()> {
        if let SparsityPattern::NM { n, m } = *self {
            if n == 0 || n >= m {
                return Err(CompressError::InvalidSparsityPattern { n, m });
            }
        }
        Ok(())
    }
}

/// A frozen boolean mask over a weight tensor. `false` marks a pruned
/// (zeroed) element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparsityMask {
    /// Keep flags, row-major, same shape as the weight
    pub keep: Vec<bool>,
    /// Weight shape
    pub shape: Vec<usize>,
}

impl SparsityMask {
    /// Number of pruned elements.
    pub fn pruned(&self) -> usize {
        self.keep.iter().filter(|&&k| !k).count()
    }

    /// Fraction of pruned elements.
    pub fn sparsity(&self) -> f32 {
        if self.keep.is_empty() {
            return 0.0;
        }
        self.pruned() as f32 / self.keep.len() as f32
    }
}

/// Keep mask zeroing the `k` lowest-saliency elements, where `k` rounds
/// the requested ratio to the nearest element count.
pub(crate) fn unstructured_mask(saliency: &[f64], ratio: f32) -> Vec<bool> {
    let len = saliency.len();
    let k = ((ratio as f64) * len as f64).round() as usize;
    if k == 0 {
        return vec![true; len];
    }

    let mut order: Vec<usize> = (0..len).collect();
    order.sort_by(|&a, &b| {
        saliency[a].partial_cmp(&saliency[b]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = vec![true; len];
    for &idx in order.iter().take(k.min(len)) {
        keep[idx] = false;
    }
    keep
}

/// Keep mask zeroing exactly `n` of every `m` contiguous elements per row.
///
/// Rows are `shape[0]` slices of length `shape[1..]`; a trailing partial
/// block (row length not divisible by `m`) is left dense.
pub(crate) fn structured_nm_mask(
    saliency: &[f64],
    shape: &[usize],
    n: usize,
    m: usize,
) -> Vec<bool> {
    let cols = if shape.len() >= 2 {
        shape[1..].iter().product::<usize>()
    } else {
        shape.first().copied().unwrap_or(saliency.len())
    };
    let rows = if cols == 0 { 0 } else { saliency.len() / cols };

    let mut keep = vec![true; saliency.len()];
    for r in 0..rows {
        let row_start = r * cols;
        let mut block_start = 0;
        while block_start + m <= cols {
            let base = row_start + block_start;
            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by(|&a, &b| {
                saliency[base + a]
                    .partial_cmp(&saliency[base + b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for &offset in order.iter().take(n) {
                keep[base + offset] = false;
            }
            block_start += m;
        }
    }
    keep
}
