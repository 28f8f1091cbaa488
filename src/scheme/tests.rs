//! Tests for scheme parsing and quantization kernels.

use super::*;
use crate::error::CompressError;
use proptest::prelude::*;

#[test]
fn test_parse_presets() {
    let scheme: QuantScheme = "W4A16".parse().unwrap();
    assert_eq!(scheme.weights.bits, 4);
    assert!(scheme.activations.is_none());

    let scheme: QuantScheme = "w8a8".parse().unwrap();
    assert_eq!(scheme.weights.bits, 8);
    assert_eq!(scheme.activations.unwrap().bits, 8);
}

#[test]
fn test_parse_unknown_scheme() {
    let err = "W2A2".parse::<QuantScheme>().unwrap_err();
    assert!(matches!(err, CompressError::UnknownScheme(_)));
}

#[test]
fn test_parse_group_size_override() {
    let scheme = QuantScheme::parse("W4A16", Some(64)).unwrap();
    assert_eq!(scheme.weights.granularity, Granularity::PerGroup { size: 64 });

    let err = QuantScheme::parse("W4A16", Some(0)).unwrap_err();
    assert!(matches!(err, CompressError::InvalidGroupSize(0)));
}

#[test]
fn test_invalid_bits_rejected() {
    let args = QuantArgs::symmetric(3);
    assert!(matches!(args.validate(), Err(CompressError::InvalidBits(3))));
}

#[test]
fn test_group_fallback_to_per_channel() {
    // 10 elements per channel do not divide into groups of 4
    let args = QuantArgs::per_group(4, 4);
    let (effective, fell_back) = args.effective_granularity(&[2, 10]);
    assert!(fell_back);
    assert_eq!(effective, Granularity::PerChannel);

    let (effective, fell_back) = args.effective_granularity(&[2, 8]);
    assert!(!fell_back);
    assert_eq!(effective, Granularity::PerGroup { size: 4 });
}

#[test]
fn test_group_index_2d() {
    // Shape [2, 8], groups of 4: channel 0 owns groups 0-1, channel 1 owns 2-3
    let g = Granularity::PerGroup { size: 4 };
    assert_eq!(g.num_groups(&[2, 8]), 4);
    assert_eq!(g.group_index(0, &[2, 8]), 0);
    assert_eq!(g.group_index(5, &[2, 8]), 1);
    assert_eq!(g.group_index(8, &[2, 8]), 2);
    assert_eq!(g.group_index(15, &[2, 8]), 3);
}

#[test]
fn test_per_channel_index() {
    let g = Granularity::PerChannel;
    assert_eq!(g.num_groups(&[4, 4]), 4);
    assert_eq!(g.group_index(7, &[4, 4]), 1);
}

#[test]
fn test_zero_variance_scale_clamped() {
    let args = QuantArgs::symmetric(8);
    let params = QuantParams::from_ranges(&[(0.0, 0.0)], &args, Granularity::PerTensor);
    assert!(params.scales[0] > 0.0);
}

#[test]
fn test_symmetric_zero_maps_to_zero_level() {
    let args = QuantArgs::symmetric(8);
    let params = QuantParams::from_ranges(&[(-3.0, 2.0)], &args, Granularity::PerTensor);
    let levels = quantize_with_params(&[0.0], &params, &[1]);
    assert_eq!(levels[0], 0);
    assert!(params.zero_points.is_empty());
}

#[test]
fn test_asymmetric_zero_point_in_range() {
    let args = QuantArgs {
        bits: 8,
        mode: QuantMode::Asymmetric,
        granularity: Granularity::PerTensor,
    };
    let params = QuantParams::from_ranges(&[(-1.0, 3.0)], &args, Granularity::PerTensor);
    assert_eq!(params.zero_points.len(), 1);
    assert!(params.zero_points[0] >= 0 && params.zero_points[0] <= 255);

    // Zero must dequantize to exactly zero
    let levels = quantize_with_params(&[0.0], &params, &[1]);
    let deq = dequantize_with_params(&levels, &params, &[1]);
    assert_eq!(deq[0], 0.0);
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(200))]

    /// Round trip stays within one quantization step over the observed range
    #[test]
    fn prop_roundtrip_within_one_step(
        values in prop::collection::vec(-100.0f32..100.0, 1..64),
        bits in prop::sample::select(vec![4u8, 8]),
        asymmetric in any::<bool>(),
    ) {
        let mode = if asymmetric { QuantMode::Asymmetric } else { QuantMode::Symmetric };
        let args = QuantArgs { bits, mode, granularity: Granularity::PerTensor };
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let params = QuantParams::from_ranges(&[(min, max)], &args, Granularity::PerTensor);

        let shape = [values.len()];
        let levels = quantize_with_params(&values, &params, &shape);
        let deq = dequantize_with_params(&levels, &params, &shape);

        let step = params.scales[0];
        for (orig, rec) in values.iter().zip(&deq) {
            prop_assert!(
                (orig - rec).abs() <= step * 0.5 + 1e-6,
                "|{} - {}| exceeds half step {}",
                orig, rec, step
            );
        }
    }

    /// All emitted levels fit the representable integer range
    #[test]
    fn prop_levels_in_range(
        values in prop::collection::vec(-1000.0f32..1000.0, 1..64),
        bits in prop::sample::select(vec![4u8, 8, 16]),
    ) {
        let args = QuantArgs::symmetric(bits);
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let params = QuantParams::from_ranges(&[(min, max)], &args, Granularity::PerTensor);

        let levels = quantize_with_params(&values, &params, &[values.len()]);
        for q in levels {
            prop_assert!(q >= args.q_min() && q <= args.q_max());
        }
    }

    /// Scales are strictly positive for any observed range
    #[test]
    fn prop_scales_positive(
        min in -100.0f32..0.0,
        span in 0.0f32..100.0,
    ) {
        let args = QuantArgs::symmetric(8);
        let params = QuantParams::from_ranges(&[(min, min + span)], &args, Granularity::PerTensor);
        prop_assert!(params.scales[0] > 0.0);
    }
}
