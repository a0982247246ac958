//! Statistical analysis for experiment variants
//!
//! Implements a two-proportion chi-square test (conversions over impressions,
//! 1 degree of freedom) between the control variant and each treatment.
//! The critical value is fixed at the 95% level regardless of the
//! experiment's configured confidence level.

use super::aggregator::round2;
use crate::model::{Comparison, OptimizationMetric, SignificanceSummary, VariantPerformance};
use tracing::debug;

/// Chi-square critical value for 1 degree of freedom at 95% confidence
pub const CHI_SQUARE_CRITICAL_95: f64 = 3.841;

/// Minimum absolute relative improvement (percent) for a significant result
pub const MIN_IMPROVEMENT_PERCENT: f64 = 5.0;

/// Confidence reported for a significant comparison
const SIGNIFICANT_CONFIDENCE: f64 = 95.0;

/// Sample size that backs a rate metric
///
/// - impressions for ctr and cpm
/// - clicks for conversion_rate and cpc
/// - conversions for cpa and roas
pub fn sample_size_for_metric(variant: &VariantPerformance, metric: OptimizationMetric) -> u64 {
    match metric {
        OptimizationMetric::ConversionRate | OptimizationMetric::Cpc => variant.counters.clicks,
        OptimizationMetric::Cpa | OptimizationMetric::Roas => variant.counters.conversions,
        OptimizationMetric::Ctr | OptimizationMetric::Cpm => variant.counters.impressions,
    }
}

/// Relative improvement of treatment over control in percent
///
/// Returns 0 when the control value is 0.
pub fn relative_improvement(control_value: f64, treatment_value: f64) -> f64 {
    if control_value == 0.0 {
        return 0.0;
    }
    (treatment_value - control_value) / control_value * 100.0
}

/// Chi-square statistic for conversions over impressions
///
/// # Arguments
/// * `n1`, `x1` - Control impressions and conversions
/// * `n2`, `x2` - Treatment impressions and conversions
///
/// # Returns
/// `(x1-E1)²/E1 + (x2-E2)²/E2` with `E = X*n/N`, or 0 when any of N, X,
/// E1, E2 is 0.
pub fn chi_square_statistic(n1: u64, x1: u64, n2: u64, x2: u64) -> f64 {
    let n1 = n1 as f64;
    let n2 = n2 as f64;
    let x1 = x1 as f64;
    let x2 = x2 as f64;

    let total = n1 + n2;
    let conversions = x1 + x2;
    if total == 0.0 || conversions == 0.0 {
        return 0.0;
    }

    let expected_control = conversions * n1 / total;
    let expected_treatment = conversions * n2 / total;
    if expected_control == 0.0 || expected_treatment == 0.0 {
        return 0.0;
    }

    (x1 - expected_control).powi(2) / expected_control
        + (x2 - expected_treatment).powi(2) / expected_treatment
}

/// Compare one treatment against the control on the optimization metric
pub fn compare_to_control(
    control: &VariantPerformance,
    treatment: &VariantPerformance,
    metric: OptimizationMetric,
) -> Comparison {
    let control_value = control.rates.value(metric);
    let treatment_value = treatment.rates.value(metric);
    let improvement = relative_improvement(control_value, treatment_value);

    let chi_square = chi_square_statistic(
        control.counters.impressions,
        control.counters.conversions,
        treatment.counters.impressions,
        treatment.counters.conversions,
    );

    let is_significant =
        chi_square > CHI_SQUARE_CRITICAL_95 && improvement.abs() > MIN_IMPROVEMENT_PERCENT;

    // Linear interpolation below the critical value
    let confidence = if is_significant {
        SIGNIFICANT_CONFIDENCE
    } else {
        chi_square / CHI_SQUARE_CRITICAL_95 * SIGNIFICANT_CONFIDENCE
    };

    Comparison {
        variant_id: treatment.variant_id,
        variant_name: treatment.variant_name.clone(),
        control_value: round2(control_value),
        treatment_value: round2(treatment_value),
        improvement: round2(improvement),
        chi_square: round3(chi_square),
        is_significant,
        confidence: round2(confidence),
        sample_size: sample_size_for_metric(treatment, metric),
    }
}

/// Split variants into the control and its treatments
///
/// The first variant flagged `is_control` is the control. When none is
/// flagged the first variant in input order is used instead.
pub fn split_control(
    variants: &[VariantPerformance],
) -> Option<(&VariantPerformance, Vec<&VariantPerformance>)> {
    let control_index = match variants.iter().position(|v| v.is_control) {
        Some(index) => index,
        None => {
            let first = variants.first()?;
            debug!(
                variant = %first.variant_name,
                "No control variant flagged, using first variant as control"
            );
            0
        }
    };

    let control = &variants[control_index];
    let treatments = variants
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != control_index)
        .map(|(_, variant)| variant)
        .collect();

    Some((control, treatments))
}

/// Run the significance test for every treatment
///
/// Fewer than two variants is not an error: the summary reports that the
/// test cannot be computed.
pub fn calculate_significance(
    variants: &[VariantPerformance],
    metric: OptimizationMetric,
) -> SignificanceSummary {
    let split = if variants.len() < 2 {
        None
    } else {
        split_control(variants)
    };

    let (control, treatments) = match split {
        Some(split) => split,
        None => {
            return SignificanceSummary {
                is_significant: false,
                control_variant_id: None,
                comparisons: Vec::new(),
                message: "Need at least 2 variants to calculate significance".to_string(),
            }
        }
    };

    let comparisons: Vec<Comparison> = treatments
        .into_iter()
        .map(|treatment| compare_to_control(control, treatment, metric))
        .collect();

    let is_significant = comparisons.iter().any(|c| c.is_significant);

    SignificanceSummary {
        is_significant,
        control_variant_id: Some(control.variant_id),
        comparisons,
        message: if is_significant {
            "Test has reached statistical significance".to_string()
        } else {
            "Test has not reached statistical significance yet".to_string()
        },
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::engine::aggregator::compute_rates;
    use crate::model::VariantCounters;
    use uuid::Uuid;

    fn performance(
        name: &str,
        is_control: bool,
        impressions: u64,
        clicks: u64,
        conversions: u64,
    ) -> VariantPerformance {
        let counters = VariantCounters {
            impressions,
            clicks,
            conversions,
            spend: 0.0,
            revenue: 0.0,
        };
        VariantPerformance {
            variant_id: Uuid::new_v4(),
            variant_name: name.to_string(),
            is_control,
            traffic_percentage: 50.0,
            rates: compute_rates(&counters),
            counters,
        }
    }

    #[test]
    fn test_chi_square_equal_groups() {
        // X = 120, E1 = E2 = 60 -> 100/60 + 100/60
        let chi = chi_square_statistic(1000, 50, 1000, 70);
        assert!((chi - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_chi_square_zero_guards() {
        assert_eq!(chi_square_statistic(0, 0, 0, 0), 0.0);
        assert_eq!(chi_square_statistic(1000, 0, 1000, 0), 0.0);
        // All impressions on one side -> an expectation is 0
        assert_eq!(chi_square_statistic(0, 0, 1000, 10), 0.0);
    }

    #[test]
    fn test_chi_square_identical_proportions_is_zero() {
        let chi = chi_square_statistic(2000, 100, 1000, 50);
        assert!(chi.abs() < 1e-12);
    }

    #[test]
    fn test_relative_improvement() {
        assert!((relative_improvement(10.0, 14.0) - 40.0).abs() < 1e-9);
        assert!((relative_improvement(10.0, 8.0) + 20.0).abs() < 1e-9);
        assert_eq!(relative_improvement(0.0, 5.0), 0.0);
    }

    #[test]
    fn test_sample_size_for_metric() {
        let variant = performance("A", true, 1000, 100, 10);
        assert_eq!(sample_size_for_metric(&variant, OptimizationMetric::Ctr), 1000);
        assert_eq!(sample_size_for_metric(&variant, OptimizationMetric::Cpm), 1000);
        assert_eq!(
            sample_size_for_metric(&variant, OptimizationMetric::ConversionRate),
            100
        );
        assert_eq!(sample_size_for_metric(&variant, OptimizationMetric::Cpc), 100);
        assert_eq!(sample_size_for_metric(&variant, OptimizationMetric::Cpa), 10);
        assert_eq!(sample_size_for_metric(&variant, OptimizationMetric::Roas), 10);
    }

    #[test]
    fn test_forty_percent_lift_below_critical_value() {
        // 50 vs 70 conversions on 1000 impressions each: chi-square is 3.333,
        // under 3.841, so the 40% lift alone does not make it significant
        let control = performance("A", true, 1000, 500, 50);
        let treatment = performance("B", false, 1000, 500, 70);

        let comparison =
            compare_to_control(&control, &treatment, OptimizationMetric::ConversionRate);

        assert_eq!(comparison.improvement, 40.0);
        assert_eq!(comparison.chi_square, 3.333);
        assert!(!comparison.is_significant);
        // (3.333 / 3.841) * 95
        assert_eq!(comparison.confidence, 82.44);
        assert_eq!(comparison.sample_size, 500);
    }

    #[test]
    fn test_clear_lift_is_significant() {
        let control = performance("A", true, 1000, 500, 50);
        let treatment = performance("B", false, 1000, 500, 80);

        let comparison =
            compare_to_control(&control, &treatment, OptimizationMetric::ConversionRate);

        assert_eq!(comparison.improvement, 60.0);
        assert!(comparison.chi_square > CHI_SQUARE_CRITICAL_95);
        assert!(comparison.is_significant);
        assert_eq!(comparison.confidence, 95.0);
    }

    #[test]
    fn test_small_improvement_is_never_significant() {
        // 4% lift is under the 5% floor
        let control = performance("A", true, 1000, 500, 50);
        let treatment = performance("B", false, 1000, 500, 52);

        let comparison =
            compare_to_control(&control, &treatment, OptimizationMetric::ConversionRate);

        assert_eq!(comparison.improvement, 4.0);
        assert!(!comparison.is_significant);
    }

    #[test]
    fn test_large_chi_square_with_flat_metric_is_not_significant() {
        // Conversions differ a lot but the optimized metric (ctr) moves 3%
        let control = performance("A", true, 1000, 100, 50);
        let treatment = performance("B", false, 1000, 103, 80);

        let comparison = compare_to_control(&control, &treatment, OptimizationMetric::Ctr);

        assert!(comparison.chi_square > CHI_SQUARE_CRITICAL_95);
        assert_eq!(comparison.improvement, 3.0);
        assert!(!comparison.is_significant);
        // Interpolated confidence is not clamped
        assert!(comparison.confidence > 95.0);
    }

    #[test]
    fn test_negative_lift_can_be_significant() {
        let control = performance("A", true, 1000, 500, 80);
        let treatment = performance("B", false, 1000, 500, 50);

        let comparison =
            compare_to_control(&control, &treatment, OptimizationMetric::ConversionRate);

        assert!(comparison.improvement < -5.0);
        assert!(comparison.is_significant);
    }

    #[test]
    fn test_calculate_significance_needs_two_variants() {
        let only = vec![performance("A", true, 1000, 100, 10)];

        let summary = calculate_significance(&only, OptimizationMetric::Ctr);

        assert!(!summary.is_significant);
        assert!(summary.comparisons.is_empty());
        assert!(summary.control_variant_id.is_none());
        assert!(summary.message.contains("at least 2"));

        let none = calculate_significance(&[], OptimizationMetric::Ctr);
        assert!(!none.is_significant);
    }

    #[test]
    fn test_flagged_control_is_used_regardless_of_position() {
        let variants = vec![
            performance("B", false, 1000, 500, 80),
            performance("A", true, 1000, 500, 50),
            performance("C", false, 1000, 500, 51),
        ];

        let summary = calculate_significance(&variants, OptimizationMetric::ConversionRate);

        assert_eq!(summary.control_variant_id, Some(variants[1].variant_id));
        assert_eq!(summary.comparisons.len(), 2);
        assert_eq!(summary.comparisons[0].variant_name, "B");
        assert_eq!(summary.comparisons[1].variant_name, "C");
        assert!(summary.is_significant);
        assert!(summary.message.contains("has reached"));
    }

    #[test]
    fn test_first_variant_is_control_when_none_flagged() {
        let variants = vec![
            performance("first", false, 1000, 500, 50),
            performance("second", false, 1000, 500, 52),
        ];

        let summary = calculate_significance(&variants, OptimizationMetric::ConversionRate);

        assert_eq!(summary.control_variant_id, Some(variants[0].variant_id));
        assert_eq!(summary.comparisons.len(), 1);
        assert_eq!(summary.comparisons[0].variant_name, "second");
        assert!(!summary.is_significant);
        assert!(summary.message.contains("not reached"));
    }

    #[test]
    fn test_overall_significant_when_any_treatment_is() {
        let variants = vec![
            performance("A", true, 1000, 500, 50),
            performance("B", false, 1000, 500, 51),
            performance("C", false, 1000, 500, 90),
        ];

        let summary = calculate_significance(&variants, OptimizationMetric::ConversionRate);

        assert!(!summary.comparisons[0].is_significant);
        assert!(summary.comparisons[1].is_significant);
        assert!(summary.is_significant);
    }
}
