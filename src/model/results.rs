//! Computed views over an experiment: rates, significance, winner,
//! progress, recommendations and the composite results document.

use super::experiment::{
    EntityType, Experiment, ExperimentStatus, OptimizationMetric, Variant, VariantCounters,
};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived rate metrics for one variant
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RateMetrics {
    /// Click-through rate in percent
    pub ctr: f64,
    /// Conversions per click in percent
    pub conversion_rate: f64,
    pub cpa: f64,
    pub roas: f64,
    pub cpc: f64,
    pub cpm: f64,
}

impl RateMetrics {
    /// Value of the given optimization metric
    pub fn value(&self, metric: OptimizationMetric) -> f64 {
        match metric {
            OptimizationMetric::Ctr => self.ctr,
            OptimizationMetric::ConversionRate => self.conversion_rate,
            OptimizationMetric::Cpa => self.cpa,
            OptimizationMetric::Roas => self.roas,
            OptimizationMetric::Cpc => self.cpc,
            OptimizationMetric::Cpm => self.cpm,
        }
    }
}

/// Counters and rates for one variant, as used by the analysis
///
/// Rates are kept at full precision; `presentation()` produces the rounded
/// copy that is returned to callers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct VariantPerformance {
    pub variant_id: Uuid,
    pub variant_name: String,
    pub is_control: bool,
    pub traffic_percentage: f64,
    pub counters: VariantCounters,
    pub rates: RateMetrics,
}

/// Statistical comparison of one treatment against the control
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Comparison {
    pub variant_id: Uuid,
    pub variant_name: String,
    /// Control value of the optimization metric
    pub control_value: f64,
    /// Treatment value of the optimization metric
    pub treatment_value: f64,
    /// Relative improvement over control in percent
    pub improvement: f64,
    pub chi_square: f64,
    pub is_significant: bool,
    /// Reported confidence in percent
    pub confidence: f64,
    /// Treatment sample size for the optimization metric
    pub sample_size: u64,
}

/// Outcome of the significance test across all treatments
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct SignificanceSummary {
    pub is_significant: bool,
    /// Control variant the comparisons were made against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_variant_id: Option<Uuid>,
    #[serde(default)]
    pub comparisons: Vec<Comparison>,
    pub message: String,
}

/// Label attached to a selected winner
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum WinnerConfidence {
    High,
}

/// Best variant for the optimization metric
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Winner {
    pub variant_id: Uuid,
    pub variant_name: String,
    pub winning_metric: OptimizationMetric,
    pub winning_value: f64,
    pub confidence: WinnerConfidence,
}

/// Time progress of an experiment
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Progress {
    pub percent_complete: f64,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub total_days: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Action,
    Info,
    Warning,
    Insight,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
}

/// What the operator should do next
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    StopTest,
    Continue,
    IncreaseBudget,
    ReviewWinner,
}

/// Advisory produced from the analysis
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub priority: Priority,
    pub message: String,
    pub suggested_action: SuggestedAction,
}

/// Experiment header included in results
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ExperimentHeader {
    pub id: Uuid,
    pub name: String,
    pub experiment_type: String,
    pub status: ExperimentStatus,
    pub optimization_metric: OptimizationMetric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Experiment> for ExperimentHeader {
    fn from(experiment: &Experiment) -> Self {
        ExperimentHeader {
            id: experiment.id,
            name: experiment.name.clone(),
            experiment_type: experiment.experiment_type.clone(),
            status: experiment.status,
            optimization_metric: experiment.optimization_metric,
            started_at: experiment.started_at,
            end_date: experiment.end_date,
            completed_at: experiment.completed_at,
        }
    }
}

/// Composite document returned by `get_results`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ExperimentResults {
    pub experiment: ExperimentHeader,
    pub progress: Progress,
    pub variants: Vec<VariantPerformance>,
    pub significance: SignificanceSummary,
    pub has_minimum_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub recommendations: Vec<Recommendation>,
}

/// Experiment together with its variants, returned by `create_experiment`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ExperimentDetail {
    #[serde(flatten)]
    pub experiment: Experiment,
    pub variants: Vec<Variant>,
}

/// One row of `list_experiments`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ExperimentSummary {
    pub id: Uuid,
    pub name: String,
    pub experiment_type: String,
    pub status: ExperimentStatus,
    pub entity_type: EntityType,
    pub optimization_metric: OptimizationMetric,
    pub variant_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ExperimentSummary {
    pub fn new(experiment: &Experiment, variant_count: usize) -> Self {
        ExperimentSummary {
            id: experiment.id,
            name: experiment.name.clone(),
            experiment_type: experiment.experiment_type.clone(),
            status: experiment.status,
            entity_type: experiment.entity_type,
            optimization_metric: experiment.optimization_metric,
            variant_count,
            started_at: experiment.started_at,
            end_date: experiment.end_date,
            completed_at: experiment.completed_at,
            created_at: experiment.created_at,
        }
    }
}

/// Page metadata for list responses
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Pagination {
    pub total: usize,
    pub per_page: usize,
    pub current_page: usize,
    pub last_page: usize,
}

impl Pagination {
    pub fn new(total: usize, per_page: usize, current_page: usize) -> Self {
        let last_page = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Pagination {
            total,
            per_page,
            current_page,
            last_page,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct ExperimentPage {
    pub experiments: Vec<ExperimentSummary>,
    pub pagination: Pagination,
}

/// Per-organisation experiment counts
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ExperimentStats {
    pub total: usize,
    pub draft: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub with_winner: usize,
}
