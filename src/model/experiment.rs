use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Experiment is a configured A/B test over a marketing entity
///
/// Owns its variants exclusively: deleting an experiment deletes every
/// variant attached to it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Experiment {
    pub id: Uuid,

    /// Organisation (ad account) the experiment belongs to
    pub org_id: String,

    pub name: String,

    /// What kind of change is under test (creative, audience, placement, ...)
    pub experiment_type: String,

    /// Kind of entity being tested
    pub entity_type: EntityType,

    /// Identifier of the tested entity in the ad platform, if linked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,

    /// Metric the experiment optimizes for
    pub optimization_metric: OptimizationMetric,

    pub status: ExperimentStatus,

    /// Planned length of the experiment in days
    pub duration_days: u32,

    /// Minimum impressions across all variants before results are considered reliable
    pub sample_size_per_variant: u64,

    /// Target confidence in percent (recorded, the significance test always uses 95%)
    pub confidence_level: f64,

    /// Smallest relative improvement (percent) the experiment should detect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_detectable_effect: Option<f64>,

    /// Budget allocated to each variant
    pub budget_per_variant: f64,

    /// Winning variant, only set once the experiment is completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_variant_id: Option<Uuid>,

    /// Reason given when the experiment was stopped manually
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Scheduled end (started_at + duration_days, moved by extensions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Build a new draft experiment from a creation spec
    pub fn from_spec(spec: &ExperimentSpec, now: DateTime<Utc>) -> Self {
        Experiment {
            id: Uuid::new_v4(),
            org_id: spec.org_id.clone(),
            name: spec.name.trim().to_string(),
            experiment_type: spec.experiment_type.clone(),
            entity_type: spec.entity_type,
            entity_id: spec.entity_id.clone(),
            hypothesis: spec.hypothesis.clone(),
            optimization_metric: spec.optimization_metric,
            status: ExperimentStatus::Draft,
            duration_days: spec.duration_days,
            sample_size_per_variant: spec.sample_size_per_variant,
            confidence_level: spec.confidence_level,
            minimum_detectable_effect: spec.minimum_detectable_effect,
            budget_per_variant: spec.budget_per_variant,
            winner_variant_id: None,
            stop_reason: None,
            started_at: None,
            end_date: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of an experiment
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Being configured; variants may be added, may be deleted
    Draft,
    /// Collecting data
    Running,
    /// Stopped manually before a winner was chosen (terminal)
    Paused,
    /// Winner selected (terminal)
    Completed,
}

impl ExperimentStatus {
    pub const ALL: [ExperimentStatus; 4] = [
        ExperimentStatus::Draft,
        ExperimentStatus::Running,
        ExperimentStatus::Paused,
        ExperimentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Paused => "paused",
            ExperimentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExperimentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown experiment status '{}'", s))
    }
}

/// Rate metric an experiment optimizes
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMetric {
    /// Click-through rate (clicks / impressions)
    #[default]
    Ctr,
    /// Conversions per click
    ConversionRate,
    /// Cost per acquisition
    Cpa,
    /// Return on ad spend
    Roas,
    /// Cost per click
    Cpc,
    /// Cost per thousand impressions
    Cpm,
}

impl OptimizationMetric {
    pub const ALL: [OptimizationMetric; 6] = [
        OptimizationMetric::Ctr,
        OptimizationMetric::ConversionRate,
        OptimizationMetric::Cpa,
        OptimizationMetric::Roas,
        OptimizationMetric::Cpc,
        OptimizationMetric::Cpm,
    ];

    /// Cost metrics are better when lower
    pub fn is_cost_metric(&self) -> bool {
        matches!(
            self,
            OptimizationMetric::Cpa | OptimizationMetric::Cpc | OptimizationMetric::Cpm
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMetric::Ctr => "ctr",
            OptimizationMetric::ConversionRate => "conversion_rate",
            OptimizationMetric::Cpa => "cpa",
            OptimizationMetric::Roas => "roas",
            OptimizationMetric::Cpc => "cpc",
            OptimizationMetric::Cpm => "cpm",
        }
    }
}

impl fmt::Display for OptimizationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OptimizationMetric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| format!("unknown optimization metric '{}'", s))
    }
}

/// Kind of marketing entity under test
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Ad,
    AdSet,
    Campaign,
    Content,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Ad => "ad",
            EntityType::AdSet => "ad_set",
            EntityType::Campaign => "campaign",
            EntityType::Content => "content",
        }
    }
}

/// Raw performance counters for a variant
///
/// Written by the ingestion pipeline only. Values never decrease.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct VariantCounters {
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub conversions: u64,
    #[serde(default)]
    pub spend: f64,
    #[serde(default)]
    pub revenue: f64,
}

impl VariantCounters {
    /// Add a delta to the accumulators
    ///
    /// Negative money deltas are ignored so the totals stay non-decreasing.
    pub fn accumulate(&mut self, delta: &VariantCounters) {
        self.impressions = self.impressions.saturating_add(delta.impressions);
        self.clicks = self.clicks.saturating_add(delta.clicks);
        self.conversions = self.conversions.saturating_add(delta.conversions);
        self.spend += delta.spend.max(0.0);
        self.revenue += delta.revenue.max(0.0);
    }
}

/// One arm of an experiment
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Variant {
    pub id: Uuid,

    /// Owning experiment
    pub experiment_id: Uuid,

    pub name: String,

    /// Baseline arm the others are compared against
    pub is_control: bool,

    /// Share of traffic routed to this variant (0-100)
    pub traffic_percentage: f64,

    /// Ad or ad set that serves this variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(default)]
    pub counters: VariantCounters,

    pub created_at: DateTime<Utc>,
}

impl Variant {
    pub fn from_spec(
        experiment_id: Uuid,
        spec: &VariantSpec,
        is_control: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Variant {
            id: Uuid::new_v4(),
            experiment_id,
            name: spec.name.trim().to_string(),
            is_control,
            traffic_percentage: spec.traffic_percentage,
            entity_id: spec.entity_id.clone(),
            counters: VariantCounters::default(),
            created_at: now,
        }
    }
}

/// Input for creating an experiment
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct ExperimentSpec {
    pub org_id: String,

    pub name: String,

    #[serde(default = "default_experiment_type")]
    pub experiment_type: String,

    #[serde(default)]
    pub entity_type: EntityType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,

    #[serde(default)]
    pub optimization_metric: OptimizationMetric,

    #[serde(default = "default_duration_days")]
    pub duration_days: u32,

    #[serde(default = "default_sample_size")]
    pub sample_size_per_variant: u64,

    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_detectable_effect: Option<f64>,

    #[serde(default = "default_budget_per_variant")]
    pub budget_per_variant: f64,

    /// Variants created together with the experiment; the first one is the control
    #[serde(default)]
    pub variants: Vec<VariantSpec>,
}

impl ExperimentSpec {
    /// Spec with every optional field at its default
    pub fn new(org_id: impl Into<String>, name: impl Into<String>) -> Self {
        ExperimentSpec {
            org_id: org_id.into(),
            name: name.into(),
            experiment_type: default_experiment_type(),
            entity_type: EntityType::default(),
            entity_id: None,
            hypothesis: None,
            optimization_metric: OptimizationMetric::default(),
            duration_days: default_duration_days(),
            sample_size_per_variant: default_sample_size(),
            confidence_level: default_confidence_level(),
            minimum_detectable_effect: None,
            budget_per_variant: default_budget_per_variant(),
            variants: Vec::new(),
        }
    }
}

/// Input for adding a variant
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct VariantSpec {
    pub name: String,

    #[serde(default = "default_traffic_percentage")]
    pub traffic_percentage: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl VariantSpec {
    pub fn new(name: impl Into<String>) -> Self {
        VariantSpec {
            name: name.into(),
            traffic_percentage: default_traffic_percentage(),
            entity_id: None,
        }
    }
}

fn default_experiment_type() -> String {
    "creative".to_string()
}

fn default_duration_days() -> u32 {
    7
}

fn default_sample_size() -> u64 {
    1000
}

fn default_confidence_level() -> f64 {
    95.0
}

fn default_budget_per_variant() -> f64 {
    100.0
}

fn default_traffic_percentage() -> f64 {
    50.0
}

#[cfg(test)]
#[path = "experiment_test.rs"]
mod tests;
