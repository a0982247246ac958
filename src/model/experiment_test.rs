#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity
#![allow(clippy::expect_used)] // Tests can use expect for better error messages

use super::*;
use chrono::TimeZone;

#[test]
fn test_experiment_spec_deserialize_from_yaml_with_defaults() {
    let yaml = r#"
org_id: acct-42
name: Headline test
variants:
  - name: Original headline
  - name: Question headline
    traffic_percentage: 30
    entity_id: ad-991
"#;

    let spec: ExperimentSpec = serde_yaml::from_str(yaml).expect("Failed to deserialize spec");

    assert_eq!(spec.org_id, "acct-42");
    assert_eq!(spec.experiment_type, "creative");
    assert_eq!(spec.entity_type, EntityType::Ad);
    assert_eq!(spec.optimization_metric, OptimizationMetric::Ctr);
    assert_eq!(spec.duration_days, 7);
    assert_eq!(spec.sample_size_per_variant, 1000);
    assert_eq!(spec.confidence_level, 95.0);
    assert_eq!(spec.budget_per_variant, 100.0);
    assert!(spec.minimum_detectable_effect.is_none());

    assert_eq!(spec.variants.len(), 2);
    assert_eq!(spec.variants[0].traffic_percentage, 50.0);
    assert_eq!(spec.variants[1].traffic_percentage, 30.0);
    assert_eq!(spec.variants[1].entity_id.as_deref(), Some("ad-991"));
}

#[test]
fn test_experiment_spec_deserialize_explicit_metric_and_entity() {
    let yaml = r#"
org_id: acct-1
name: Audience split
experiment_type: audience
entity_type: ad_set
optimization_metric: conversion_rate
duration_days: 14
confidence_level: 99
minimum_detectable_effect: 10
"#;

    let spec: ExperimentSpec = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(spec.entity_type, EntityType::AdSet);
    assert_eq!(spec.optimization_metric, OptimizationMetric::ConversionRate);
    assert_eq!(spec.duration_days, 14);
    assert_eq!(spec.confidence_level, 99.0);
    assert_eq!(spec.minimum_detectable_effect, Some(10.0));
}

#[test]
fn test_unknown_metric_is_rejected() {
    let yaml = r#"
org_id: acct-1
name: Bad metric
optimization_metric: bounce_rate
"#;

    let result: Result<ExperimentSpec, _> = serde_yaml::from_str(yaml);
    assert!(result.is_err());
}

#[test]
fn test_status_serializes_snake_case() {
    let json = serde_json::to_string(&ExperimentStatus::Running).unwrap();
    assert_eq!(json, "\"running\"");

    let status: ExperimentStatus = serde_json::from_str("\"completed\"").unwrap();
    assert_eq!(status, ExperimentStatus::Completed);
}

#[test]
fn test_status_from_str_round_trips_display() {
    for status in ExperimentStatus::ALL {
        assert_eq!(status.to_string().parse::<ExperimentStatus>(), Ok(status));
    }
    assert!("stopped".parse::<ExperimentStatus>().is_err());
}

#[test]
fn test_cost_metrics() {
    assert!(OptimizationMetric::Cpa.is_cost_metric());
    assert!(OptimizationMetric::Cpc.is_cost_metric());
    assert!(OptimizationMetric::Cpm.is_cost_metric());
    assert!(!OptimizationMetric::Ctr.is_cost_metric());
    assert!(!OptimizationMetric::ConversionRate.is_cost_metric());
    assert!(!OptimizationMetric::Roas.is_cost_metric());
}

#[test]
fn test_metric_from_str() {
    assert_eq!(
        "conversion_rate".parse::<OptimizationMetric>(),
        Ok(OptimizationMetric::ConversionRate)
    );
    assert!("CTR".parse::<OptimizationMetric>().is_err());
}

#[test]
fn test_experiment_from_spec_starts_in_draft() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let mut spec = ExperimentSpec::new("acct-7", "  Spring promo  ");
    spec.optimization_metric = OptimizationMetric::Roas;

    let experiment = Experiment::from_spec(&spec, now);

    assert_eq!(experiment.status, ExperimentStatus::Draft);
    assert_eq!(experiment.name, "Spring promo");
    assert_eq!(experiment.optimization_metric, OptimizationMetric::Roas);
    assert_eq!(experiment.created_at, now);
    assert!(experiment.started_at.is_none());
    assert!(experiment.end_date.is_none());
    assert!(experiment.winner_variant_id.is_none());
}

#[test]
fn test_counters_accumulate_never_decrease() {
    let mut counters = VariantCounters {
        impressions: 100,
        clicks: 10,
        conversions: 2,
        spend: 50.0,
        revenue: 80.0,
    };

    counters.accumulate(&VariantCounters {
        impressions: 50,
        clicks: 5,
        conversions: 1,
        spend: -20.0,
        revenue: 10.0,
    });

    assert_eq!(counters.impressions, 150);
    assert_eq!(counters.clicks, 15);
    assert_eq!(counters.conversions, 3);
    assert_eq!(counters.spend, 50.0);
    assert_eq!(counters.revenue, 90.0);
}

#[test]
fn test_experiment_serializes_without_empty_optionals() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let experiment = Experiment::from_spec(&ExperimentSpec::new("acct-7", "Promo"), now);

    let value = serde_json::to_value(&experiment).unwrap();

    assert_eq!(value["status"], "draft");
    assert_eq!(value["optimization_metric"], "ctr");
    assert!(value.get("winner_variant_id").is_none());
    assert!(value.get("started_at").is_none());
}
