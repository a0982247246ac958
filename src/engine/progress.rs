use super::aggregator::round1;
use crate::model::{Experiment, ExperimentStatus, Progress};
use chrono::{DateTime, Utc};

/// Calculate time progress of an experiment
///
/// Only running experiments have meaningful progress:
/// - `total_days` = whole days from started_at to end_date
/// - `days_elapsed` = whole days since started_at (never negative)
/// - `days_remaining` = whole days until end_date (never negative)
/// - `percent_complete` = elapsed / total * 100, clamped to 0-100, 0 when total is 0
///
/// Completed experiments report 100%; draft and paused report 0.
///
/// # Arguments
/// * `experiment` - The experiment to measure
/// * `now` - Current time (from the injected clock)
pub fn calculate_progress(experiment: &Experiment, now: DateTime<Utc>) -> Progress {
    match experiment.status {
        ExperimentStatus::Running => {}
        ExperimentStatus::Completed => {
            return Progress {
                percent_complete: 100.0,
                ..Default::default()
            }
        }
        ExperimentStatus::Draft | ExperimentStatus::Paused => return Progress::default(),
    }

    let (started, end) = match (experiment.started_at, experiment.end_date) {
        (Some(started), Some(end)) => (started, end),
        _ => return Progress::default(),
    };

    let total_days = end.signed_duration_since(started).num_days();
    let days_elapsed = now.signed_duration_since(started).num_days().max(0);
    let days_remaining = end.signed_duration_since(now).num_days().max(0);

    Progress {
        percent_complete: percent_complete(days_elapsed, total_days),
        days_elapsed,
        days_remaining,
        total_days,
    }
}

fn percent_complete(days_elapsed: i64, total_days: i64) -> f64 {
    if total_days <= 0 {
        return 0.0;
    }
    let percent = days_elapsed as f64 / total_days as f64 * 100.0;
    round1(percent.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::model::ExperimentSpec;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn running(started: DateTime<Utc>, days: i64) -> Experiment {
        let mut experiment = Experiment::from_spec(&ExperimentSpec::new("acct", "x"), started);
        experiment.status = ExperimentStatus::Running;
        experiment.started_at = Some(started);
        experiment.end_date = Some(started + Duration::days(days));
        experiment
    }

    #[test]
    fn test_progress_midway() {
        let experiment = running(base_time(), 10);
        let progress = calculate_progress(&experiment, base_time() + Duration::days(4));

        assert_eq!(progress.total_days, 10);
        assert_eq!(progress.days_elapsed, 4);
        assert_eq!(progress.days_remaining, 6);
        assert_eq!(progress.percent_complete, 40.0);
    }

    #[test]
    fn test_progress_rounds_to_one_decimal() {
        let experiment = running(base_time(), 3);
        let progress = calculate_progress(&experiment, base_time() + Duration::days(2));
        assert_eq!(progress.percent_complete, 66.7);
    }

    #[test]
    fn test_progress_past_end_date_is_clamped() {
        let experiment = running(base_time(), 7);
        let progress = calculate_progress(&experiment, base_time() + Duration::days(30));

        assert_eq!(progress.percent_complete, 100.0);
        assert_eq!(progress.days_remaining, 0);
        assert_eq!(progress.days_elapsed, 30);
    }

    #[test]
    fn test_progress_zero_length_duration() {
        let experiment = running(base_time(), 0);
        let progress = calculate_progress(&experiment, base_time() + Duration::hours(5));

        assert_eq!(progress.total_days, 0);
        assert_eq!(progress.percent_complete, 0.0);
    }

    #[test]
    fn test_progress_end_before_start() {
        let experiment = running(base_time(), -3);
        let progress = calculate_progress(&experiment, base_time() + Duration::days(1));

        assert_eq!(progress.percent_complete, 0.0);
        assert_eq!(progress.days_remaining, 0);
    }

    #[test]
    fn test_progress_now_before_start() {
        let experiment = running(base_time(), 7);
        let progress = calculate_progress(&experiment, base_time() - Duration::days(2));

        assert_eq!(progress.days_elapsed, 0);
        assert_eq!(progress.percent_complete, 0.0);
    }

    #[test]
    fn test_percent_always_within_bounds() {
        for total in -5..15 {
            for offset in -10..40 {
                let experiment = running(base_time(), total);
                let progress =
                    calculate_progress(&experiment, base_time() + Duration::days(offset));
                assert!(
                    (0.0..=100.0).contains(&progress.percent_complete),
                    "total={} offset={} percent={}",
                    total,
                    offset,
                    progress.percent_complete
                );
            }
        }
    }

    #[test]
    fn test_completed_reports_full_progress() {
        let mut experiment = running(base_time(), 7);
        experiment.status = ExperimentStatus::Completed;

        let progress = calculate_progress(&experiment, base_time() + Duration::days(2));

        assert_eq!(progress.percent_complete, 100.0);
        assert_eq!(progress.days_elapsed, 0);
        assert_eq!(progress.days_remaining, 0);
    }

    #[test]
    fn test_draft_and_paused_report_nothing() {
        let draft = Experiment::from_spec(&ExperimentSpec::new("acct", "x"), base_time());
        assert_eq!(calculate_progress(&draft, base_time()), Progress::default());

        let mut paused = running(base_time(), 7);
        paused.status = ExperimentStatus::Paused;
        assert_eq!(
            calculate_progress(&paused, base_time() + Duration::days(3)),
            Progress::default()
        );
    }
}
