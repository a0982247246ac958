//! Winner selection by optimization metric
//!
//! Cost metrics (cpa, cpc, cpm) rank ascending, everything else descending.
//! The sort is stable so ties keep input order.

use super::aggregator::round2;
use crate::model::{OptimizationMetric, VariantPerformance, Winner, WinnerConfidence};
use std::cmp::Ordering;

/// Rank variants from best to worst for the metric
pub fn rank_variants(
    variants: &[VariantPerformance],
    metric: OptimizationMetric,
) -> Vec<&VariantPerformance> {
    let mut ranked: Vec<&VariantPerformance> = variants.iter().collect();
    let ascending = metric.is_cost_metric();

    ranked.sort_by(|a, b| {
        let a_value = a.rates.value(metric);
        let b_value = b.rates.value(metric);
        let ordering = a_value.partial_cmp(&b_value).unwrap_or(Ordering::Equal);
        if ascending {
            ordering
        } else {
            ordering.reverse()
        }
    });

    ranked
}

/// Pick the best variant for the metric
///
/// The confidence label is always `High`; statistical strength is reported
/// separately by the significance summary.
pub fn identify_winner(
    variants: &[VariantPerformance],
    metric: OptimizationMetric,
) -> Option<Winner> {
    let best = rank_variants(variants, metric).into_iter().next()?;

    Some(Winner {
        variant_id: best.variant_id,
        variant_name: best.variant_name.clone(),
        winning_metric: metric,
        winning_value: round2(best.rates.value(metric)),
        confidence: WinnerConfidence::High,
    })
}
