//! Rule-based advisories for a running experiment
//!
//! Rules are evaluated independently; several can fire for the same result.
//! Recommendations never change experiment state, they only suggest an action.

use crate::model::{
    Experiment, ExperimentStatus, Priority, Recommendation, RecommendationKind,
    SignificanceSummary, SuggestedAction, VariantPerformance,
};

/// Improvement (percent) above which a variant is flagged for review
pub const STRONG_IMPROVEMENT_PERCENT: f64 = 20.0;

/// Generate recommendations from the analysis of an experiment
///
/// # Rules
/// - running and significant → stop the test (high)
/// - running and not significant → keep running (medium)
/// - total impressions under the sample size threshold → increase budget (medium)
/// - best improvement above 20% → review the winner (high)
pub fn generate_recommendations(
    experiment: &Experiment,
    variants: &[VariantPerformance],
    significance: &SignificanceSummary,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if experiment.status == ExperimentStatus::Running {
        if significance.is_significant {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Action,
                priority: Priority::High,
                message: "Test has reached statistical significance. Consider stopping the test and implementing the winner.".to_string(),
                suggested_action: SuggestedAction::StopTest,
            });
        } else {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Info,
                priority: Priority::Medium,
                message: "Test has not reached statistical significance yet. Continue running for more conclusive results.".to_string(),
                suggested_action: SuggestedAction::Continue,
            });
        }
    }

    if total_impressions(variants) < experiment.sample_size_per_variant {
        recommendations.push(Recommendation {
            kind: RecommendationKind::Warning,
            priority: Priority::Medium,
            message: "Test has not reached minimum sample size. Results may not be reliable yet."
                .to_string(),
            suggested_action: SuggestedAction::IncreaseBudget,
        });
    }

    if let Some(best) = best_improvement(significance) {
        if best > STRONG_IMPROVEMENT_PERCENT {
            recommendations.push(Recommendation {
                kind: RecommendationKind::Insight,
                priority: Priority::High,
                message: format!(
                    "One variant shows {}% improvement over control. Strong performance detected!",
                    best
                ),
                suggested_action: SuggestedAction::ReviewWinner,
            });
        }
    }

    recommendations
}

/// Impressions summed over every variant
pub fn total_impressions(variants: &[VariantPerformance]) -> u64 {
    variants
        .iter()
        .fold(0u64, |sum, v| sum.saturating_add(v.counters.impressions))
}

fn best_improvement(significance: &SignificanceSummary) -> Option<f64> {
    significance
        .comparisons
        .iter()
        .map(|c| c.improvement)
        .fold(None, |best, value| match best {
            Some(current) if current >= value => Some(current),
            _ => Some(value),
        })
}
