//! Pure experiment analysis: no I/O, no clock, no store.
//!
//! - `aggregator`: counters → rate metrics
//! - `significance`: chi-square test of each treatment against the control
//! - `winner`: best variant for the optimization metric
//! - `progress`: elapsed/remaining time
//! - `recommendations`: rule-based advisories
//! - `lifecycle`: legal status transitions

pub mod aggregator;
pub mod lifecycle;
pub mod progress;
pub mod recommendations;
pub mod significance;
pub mod winner;

use crate::model::{Experiment, ExperimentHeader, ExperimentResults, ExperimentStatus, Variant};
use chrono::{DateTime, Utc};

pub use lifecycle::Transition;

/// Run the full analysis pipeline for an experiment
///
/// Progress and per-variant rates first, then significance, then winner and
/// recommendations. A winner is only reported for completed experiments
/// whose overall result is significant.
pub fn analyze(
    experiment: &Experiment,
    variants: &[Variant],
    now: DateTime<Utc>,
) -> ExperimentResults {
    let progress = progress::calculate_progress(experiment, now);

    let performances: Vec<_> = variants
        .iter()
        .map(aggregator::variant_performance)
        .collect();

    let significance =
        significance::calculate_significance(&performances, experiment.optimization_metric);

    let has_minimum_sample =
        recommendations::total_impressions(&performances) >= experiment.sample_size_per_variant;

    let winner = if experiment.status == ExperimentStatus::Completed && significance.is_significant
    {
        winner::identify_winner(&performances, experiment.optimization_metric)
    } else {
        None
    };

    let recommendations =
        recommendations::generate_recommendations(experiment, &performances, &significance);

    ExperimentResults {
        experiment: ExperimentHeader::from(experiment),
        progress,
        variants: performances.iter().map(aggregator::presentation).collect(),
        significance,
        has_minimum_sample,
        winner,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::{
        ExperimentSpec, OptimizationMetric, SuggestedAction, VariantCounters, VariantSpec,
    };
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap()
    }

    fn fixture(status: ExperimentStatus) -> (Experiment, Vec<Variant>) {
        let mut spec = ExperimentSpec::new("acct", "Checkout copy");
        spec.optimization_metric = OptimizationMetric::ConversionRate;
        spec.sample_size_per_variant = 1000;

        let started = now() - Duration::days(3);
        let mut experiment = Experiment::from_spec(&spec, started);
        experiment.status = status;
        experiment.started_at = Some(started);
        experiment.end_date = Some(started + Duration::days(6));

        let mut control = Variant::from_spec(experiment.id, &VariantSpec::new("A"), true, started);
        control.counters = VariantCounters {
            impressions: 1000,
            clicks: 500,
            conversions: 50,
            spend: 250.0,
            revenue: 600.0,
        };
        let mut treatment =
            Variant::from_spec(experiment.id, &VariantSpec::new("B"), false, started);
        treatment.counters = VariantCounters {
            impressions: 1000,
            clicks: 500,
            conversions: 80,
            spend: 250.0,
            revenue: 900.0,
        };

        (experiment, vec![control, treatment])
    }

    #[test]
    fn test_analyze_running_experiment() {
        let (experiment, variants) = fixture(ExperimentStatus::Running);

        let results = analyze(&experiment, &variants, now());

        assert_eq!(results.progress.percent_complete, 50.0);
        assert_eq!(results.variants.len(), 2);
        assert_eq!(results.variants[1].rates.conversion_rate, 16.0);
        assert!(results.significance.is_significant);
        assert!(results.has_minimum_sample);
        // Running experiments never report a winner
        assert!(results.winner.is_none());

        let actions: Vec<_> = results
            .recommendations
            .iter()
            .map(|r| r.suggested_action)
            .collect();
        assert_eq!(
            actions,
            vec![SuggestedAction::StopTest, SuggestedAction::ReviewWinner]
        );
    }

    #[test]
    fn test_analyze_completed_significant_reports_winner() {
        let (experiment, variants) = fixture(ExperimentStatus::Completed);

        let results = analyze(&experiment, &variants, now());

        let winner = results.winner.unwrap();
        assert_eq!(winner.variant_name, "B");
        assert_eq!(winner.winning_value, 16.0);
        assert_eq!(results.progress.percent_complete, 100.0);
    }

    #[test]
    fn test_analyze_completed_not_significant_has_no_winner() {
        let (experiment, mut variants) = fixture(ExperimentStatus::Completed);
        variants[1].counters.conversions = 51;

        let results = analyze(&experiment, &variants, now());

        assert!(!results.significance.is_significant);
        assert!(results.winner.is_none());
    }

    #[test]
    fn test_analyze_single_variant_is_not_computable() {
        let (experiment, mut variants) = fixture(ExperimentStatus::Running);
        variants.truncate(1);

        let results = analyze(&experiment, &variants, now());

        assert!(!results.significance.is_significant);
        assert!(results.significance.comparisons.is_empty());
        assert_eq!(
            results.recommendations[0].suggested_action,
            SuggestedAction::Continue
        );
    }
}
