//! Rate metrics derived from raw variant counters
//!
//! Every division is guarded: a zero denominator yields 0, never NaN or inf.

use crate::model::{RateMetrics, Variant, VariantCounters, VariantPerformance};

/// Compute full-precision rate metrics from raw counters
pub fn compute_rates(counters: &VariantCounters) -> RateMetrics {
    let impressions = counters.impressions as f64;
    let clicks = counters.clicks as f64;
    let conversions = counters.conversions as f64;

    RateMetrics {
        ctr: safe_div(clicks, impressions) * 100.0,
        conversion_rate: safe_div(conversions, clicks) * 100.0,
        cpa: safe_div(counters.spend, conversions),
        roas: safe_div(counters.revenue, counters.spend),
        cpc: safe_div(counters.spend, clicks),
        cpm: safe_div(counters.spend, impressions) * 1000.0,
    }
}

/// Build the analysis record for a variant
pub fn variant_performance(variant: &Variant) -> VariantPerformance {
    VariantPerformance {
        variant_id: variant.id,
        variant_name: variant.name.clone(),
        is_control: variant.is_control,
        traffic_percentage: variant.traffic_percentage,
        counters: variant.counters.clone(),
        rates: compute_rates(&variant.counters),
    }
}

/// Copy of a performance record rounded for presentation
pub fn presentation(performance: &VariantPerformance) -> VariantPerformance {
    let mut rounded = performance.clone();
    rounded.counters.spend = round2(performance.counters.spend);
    rounded.counters.revenue = round2(performance.counters.revenue);
    rounded.rates = RateMetrics {
        ctr: round2(performance.rates.ctr),
        conversion_rate: round2(performance.rates.conversion_rate),
        cpa: round2(performance.rates.cpa),
        roas: round2(performance.rates.roas),
        cpc: round2(performance.rates.cpc),
        cpm: round2(performance.rates.cpm),
    };
    rounded
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 1 decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(
        impressions: u64,
        clicks: u64,
        conversions: u64,
        spend: f64,
        revenue: f64,
    ) -> VariantCounters {
        VariantCounters {
            impressions,
            clicks,
            conversions,
            spend,
            revenue,
        }
    }

    #[test]
    fn test_compute_rates_typical_campaign() {
        let rates = compute_rates(&counters(10_000, 250, 20, 500.0, 1500.0));

        assert!((rates.ctr - 2.5).abs() < 1e-9);
        assert!((rates.conversion_rate - 8.0).abs() < 1e-9);
        assert!((rates.cpa - 25.0).abs() < 1e-9);
        assert!((rates.roas - 3.0).abs() < 1e-9);
        assert!((rates.cpc - 2.0).abs() < 1e-9);
        assert!((rates.cpm - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_compute_rates_all_zero_counters() {
        let rates = compute_rates(&VariantCounters::default());
        assert_eq!(rates, RateMetrics::default());
    }

    #[test]
    fn test_compute_rates_zero_denominators_are_guarded() {
        // Spend without any delivery
        let rates = compute_rates(&counters(0, 0, 0, 42.0, 0.0));

        assert_eq!(rates.ctr, 0.0);
        assert_eq!(rates.conversion_rate, 0.0);
        assert_eq!(rates.cpa, 0.0);
        assert_eq!(rates.cpc, 0.0);
        assert_eq!(rates.cpm, 0.0);
        assert_eq!(rates.roas, 0.0);
        assert!(rates.roas.is_finite());
    }

    #[test]
    fn test_compute_rates_keeps_full_precision() {
        let rates = compute_rates(&counters(3, 1, 0, 0.0, 0.0));
        assert!((rates.ctr - 100.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_presentation_rounds_to_two_decimals() {
        let variant = Variant {
            id: uuid::Uuid::new_v4(),
            experiment_id: uuid::Uuid::new_v4(),
            name: "B".to_string(),
            is_control: false,
            traffic_percentage: 50.0,
            entity_id: None,
            counters: counters(3, 1, 0, 10.005, 7.333),
            created_at: chrono::Utc::now(),
        };

        let performance = variant_performance(&variant);
        let rounded = presentation(&performance);

        assert_eq!(rounded.rates.ctr, 33.33);
        assert_eq!(rounded.counters.revenue, 7.33);
        // Source record untouched
        assert!((performance.rates.ctr - 100.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_helpers() {
        assert_eq!(round2(1.006), 1.01);
        assert_eq!(round2(-4.444), -4.44);
        assert_eq!(round1(66.66), 66.7);
    }
}
