//! Tests for statistics collectors.

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use proptest::prelude::*;

use super::hessian::{cholesky_lower, damped_inverse_cholesky};
use super::*;
use crate::scheme::{Granularity, QuantArgs, QuantMode};

#[test]
fn test_minmax_symmetric_scale_from_absmax() {
    let mut obs = MinMaxObserver::new(QuantArgs::symmetric(8), &[4]);
    obs.update(&[-4.0, 1.0, 2.0, 3.0]);
    let params = obs.finalize();
    assert_eq!(params.num_groups(), 1);
    assert_abs_diff_eq!(params.scales[0], 4.0 / 127.0, epsilon = 1e-7);
    assert!(params.zero_points.is_empty());
}

#[test]
fn test_minmax_running_across_batches() {
    let mut obs = MinMaxObserver::new(QuantArgs::symmetric(8), &[2]);
    obs.update(&[1.0, -1.0]);
    obs.update(&[5.0, 0.5]);
    let params = obs.finalize();
    assert_abs_diff_eq!(params.scales[0], 5.0 / 127.0, epsilon = 1e-7);
    assert_eq!(obs.batches(), 2);
}

#[test]
fn test_minmax_per_channel() {
    let mut obs = MinMaxObserver::new(QuantArgs::per_channel(8), &[2, 2]);
    obs.update(&[1.0, -2.0, 10.0, 4.0]);
    let params = obs.finalize();
    assert_eq!(params.num_groups(), 2);
    assert_abs_diff_eq!(params.scales[0], 2.0 / 127.0, epsilon = 1e-7);
    assert_abs_diff_eq!(params.scales[1], 10.0 / 127.0, epsilon = 1e-7);
}

#[test]
fn test_minmax_asymmetric_range() {
    let args =
        QuantArgs { bits: 8, mode: QuantMode::Asymmetric, granularity: Granularity::PerTensor };
    let mut obs = MinMaxObserver::new(args, &[3]);
    obs.update(&[0.0, 1.0, 2.0]);
    let params = obs.finalize();
    assert_abs_diff_eq!(params.scales[0], 2.0 / 255.0, epsilon = 1e-7);
    assert_eq!(params.zero_points[0], 0);
}

#[test]
fn test_minmax_constant_channel_positive_scale() {
    let mut obs = MinMaxObserver::new(QuantArgs::per_channel(8), &[2, 2]);
    obs.update(&[0.0, 0.0, 1.0, 1.0]);
    let params = obs.finalize();
    assert!(params.scales[0] > 0.0);
}

#[test]
fn test_minmax_group_fallback() {
    // 6 columns do not divide into groups of 4
    let args = QuantArgs::per_group(8, 4);
    let obs = MinMaxObserver::new(args, &[2, 6]);
    assert!(obs.fell_back_to_per_channel());
}

#[test]
fn test_hessian_accumulates_outer_products() {
    let mut acc = HessianAccumulator::new(2);
    acc.update(&[1.0, 0.0]);
    // After one sample: H = 2 * x x^T
    assert_abs_diff_eq!(acc.matrix()[[0, 0]], 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(acc.matrix()[[1, 1]], 0.0, epsilon = 1e-12);

    acc.update(&[0.0, 1.0]);
    // Renormalized: H = (2/2) * (x1 x1^T + x2 x2^T)
    assert_abs_diff_eq!(acc.matrix()[[0, 0]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(acc.matrix()[[1, 1]], 1.0, epsilon = 1e-12);
    assert_eq!(acc.samples(), 2);
}

#[test]
fn test_hessian_magnitude_bounded_over_many_samples() {
    let mut acc = HessianAccumulator::new(2);
    for _ in 0..10_000 {
        acc.update(&[1.0, 1.0]);
    }
    // Mean outer product times 2, not a raw sum over 10k samples
    assert_abs_diff_eq!(acc.matrix()[[0, 0]], 2.0, epsilon = 1e-6);
}

#[test]
fn test_cholesky_identity() {
    let eye = Array2::<f64>::eye(3);
    let l = cholesky_lower(&eye).unwrap();
    assert_abs_diff_eq!(l[[0, 0]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(l[[2, 1]], 0.0, epsilon = 1e-12);
}

#[test]
fn test_cholesky_singular_returns_none() {
    let singular = Array2::<f64>::zeros((2, 2));
    assert!(cholesky_lower(&singular).is_none());
}

#[test]
fn test_damped_inverse_of_diagonal() {
    // H = diag(4, 4); with 1% damping, H' = diag(4.04, 4.04)
    let mut h = Array2::<f64>::zeros((2, 2));
    h[[0, 0]] = 4.0;
    h[[1, 1]] = 4.0;
    let u = damped_inverse_cholesky(&h, 0.01).unwrap();
    // U^T U = H'^{-1}, so U[0,0] = 1/sqrt(4.04)
    assert_abs_diff_eq!(u[[0, 0]], (1.0f64 / 4.04).sqrt(), epsilon = 1e-12);
    assert_abs_diff_eq!(u[[0, 1]], 0.0, epsilon = 1e-12);
}

#[test]
fn test_damped_inverse_rescues_near_singular() {
    // Rank-1 matrix with a nonzero diagonal mean becomes invertible after damping
    let mut h = Array2::<f64>::zeros((2, 2));
    h[[0, 0]] = 1.0;
    assert!(cholesky_lower(&h).is_none());
    assert!(damped_inverse_cholesky(&h, 0.01).is_some());
}

#[test]
fn test_damped_inverse_zero_matrix_is_singular() {
    let h = Array2::<f64>::zeros((3, 3));
    assert!(damped_inverse_cholesky(&h, 0.01).is_none());
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    /// U^T U reproduces the inverse of the damped accumulator
    #[test]
    fn prop_inverse_factor_roundtrip(
        rows in prop::collection::vec(prop::collection::vec(-2.0f32..2.0, 3), 4..12),
    ) {
        let mut acc = HessianAccumulator::new(3);
        for row in &rows {
            acc.update(row);
        }

        if let Some(u) = damped_inverse_cholesky(acc.matrix(), 0.01) {
            // (U^T U) * H' should be close to identity
            let n = 3;
            let mean_diag = (0..n).map(|i| acc.matrix()[[i, i]]).sum::<f64>() / n as f64;
            let mut damped = acc.matrix().clone();
            for i in 0..n {
                damped[[i, i]] += 0.01 * mean_diag;
            }
            let inv = u.t().dot(&u);
            let product = inv.dot(&damped);
            for i in 0..n {
                for j in 0..n {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    prop_assert!(
                        (product[[i, j]] - expected).abs() < 1e-6,
                        "product[{},{}] = {}", i, j, product[[i, j]]
                    );
                }
            }
        }
    }

    /// Observer finalize never emits a non-positive scale
    #[test]
    fn prop_observer_scales_positive(
        values in prop::collection::vec(-50.0f32..50.0, 8),
    ) {
        let mut obs = MinMaxObserver::new(QuantArgs::per_channel(8), &[2, 4]);
        obs.update(&values);
        let params = obs.finalize();
        for &s in &params.scales {
            prop_assert!(s > 0.0);
        }
    }
}
