//! Input validation for experiment and variant specs
//!
//! Returns the first problem found as a human-readable string, the same
//! shape the admission checks use.

use crate::model::{ExperimentSpec, VariantSpec};
use std::time::Duration;

/// Upper bound for experiment length and extensions
pub const MAX_DURATION_DAYS: u32 = 365;

/// Validate an experiment creation spec, including any inline variants
pub fn validate_experiment_spec(spec: &ExperimentSpec) -> Result<(), String> {
    if spec.org_id.trim().is_empty() {
        return Err("org_id cannot be empty".to_string());
    }

    if spec.name.trim().is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if spec.experiment_type.trim().is_empty() {
        return Err("experiment_type cannot be empty".to_string());
    }

    if spec.duration_days == 0 || spec.duration_days > MAX_DURATION_DAYS {
        return Err(format!(
            "duration_days must be between 1 and {} (got {})",
            MAX_DURATION_DAYS, spec.duration_days
        ));
    }

    if !(spec.confidence_level > 0.0 && spec.confidence_level < 100.0) {
        return Err(format!(
            "confidence_level must be between 0 and 100 exclusive (got {})",
            spec.confidence_level
        ));
    }

    if let Some(mde) = spec.minimum_detectable_effect {
        if !(mde.is_finite() && mde > 0.0) {
            return Err(format!(
                "minimum_detectable_effect must be positive (got {})",
                mde
            ));
        }
    }

    if !(spec.budget_per_variant.is_finite() && spec.budget_per_variant >= 0.0) {
        return Err(format!(
            "budget_per_variant must be >= 0 (got {})",
            spec.budget_per_variant
        ));
    }

    for (i, variant) in spec.variants.iter().enumerate() {
        validate_variant_spec(variant).map_err(|e| format!("variants[{}]: {}", i, e))?;
    }

    Ok(())
}

/// Validate a variant spec
pub fn validate_variant_spec(spec: &VariantSpec) -> Result<(), String> {
    if spec.name.trim().is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if !(spec.traffic_percentage.is_finite()
        && (0.0..=100.0).contains(&spec.traffic_percentage))
    {
        return Err(format!(
            "traffic_percentage must be between 0 and 100 (got {})",
            spec.traffic_percentage
        ));
    }

    Ok(())
}

/// Validate the number of days an experiment is extended by
pub fn validate_extension(additional_days: i64) -> Result<u32, String> {
    if additional_days <= 0 || additional_days > i64::from(MAX_DURATION_DAYS) {
        return Err(format!(
            "additional_days must be between 1 and {} (got {})",
            MAX_DURATION_DAYS, additional_days
        ));
    }
    u32::try_from(additional_days).map_err(|e| e.to_string())
}

/// Parse duration string (e.g., "5m", "30s", "1h") into Duration
///
/// Limits:
/// - Seconds: max 86400s (24 hours)
/// - Minutes: max 1440m (24 hours)
/// - Hours: max 168h (1 week)
///
/// Returns None for zero, overflow, or unknown units.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();
    let unit = duration_str.chars().last()?;
    let number: u64 = duration_str[..duration_str.len() - unit.len_utf8()]
        .parse()
        .ok()?;

    if number == 0 {
        return None;
    }

    let (limit, multiplier) = match unit {
        's' => (86_400, 1),
        'm' => (1_440, 60),
        'h' => (168, 3_600),
        _ => return None,
    };

    if number > limit {
        return None;
    }
    number.checked_mul(multiplier).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ExperimentSpec {
        let mut spec = ExperimentSpec::new("acct", "Headline test");
        spec.variants = vec![VariantSpec::new("A"), VariantSpec::new("B")];
        spec
    }

    #[test]
    fn test_valid_spec() {
        assert_eq!(validate_experiment_spec(&spec()), Ok(()));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut spec = spec();
        spec.name = "   ".into();
        assert_eq!(
            validate_experiment_spec(&spec),
            Err("name cannot be empty".to_string())
        );
    }

    #[test]
    fn test_duration_bounds() {
        let mut spec = spec();
        spec.duration_days = 0;
        assert!(validate_experiment_spec(&spec).is_err());
        spec.duration_days = 366;
        assert!(validate_experiment_spec(&spec).is_err());
        spec.duration_days = 365;
        assert!(validate_experiment_spec(&spec).is_ok());
    }

    #[test]
    fn test_confidence_bounds() {
        let mut spec = spec();
        spec.confidence_level = 100.0;
        assert!(validate_experiment_spec(&spec).is_err());
        spec.confidence_level = 0.0;
        assert!(validate_experiment_spec(&spec).is_err());
        spec.confidence_level = 90.0;
        assert!(validate_experiment_spec(&spec).is_ok());
    }

    #[test]
    fn test_negative_budget_and_mde() {
        let mut spec = spec();
        spec.budget_per_variant = -1.0;
        assert!(validate_experiment_spec(&spec).is_err());

        let mut spec = self::spec();
        spec.minimum_detectable_effect = Some(0.0);
        assert!(validate_experiment_spec(&spec).is_err());
    }

    #[test]
    fn test_inline_variant_error_is_indexed() {
        let mut spec = spec();
        spec.variants[1].traffic_percentage = 120.0;
        let err = validate_experiment_spec(&spec).unwrap_err();
        assert!(err.starts_with("variants[1]:"), "{}", err);
    }

    #[test]
    fn test_variant_traffic_bounds() {
        let mut variant = VariantSpec::new("A");
        variant.traffic_percentage = 0.0;
        assert!(validate_variant_spec(&variant).is_ok());
        variant.traffic_percentage = 100.0;
        assert!(validate_variant_spec(&variant).is_ok());
        variant.traffic_percentage = f64::NAN;
        assert!(validate_variant_spec(&variant).is_err());
    }

    #[test]
    fn test_extension_bounds() {
        assert!(validate_extension(0).is_err());
        assert!(validate_extension(-3).is_err());
        assert!(validate_extension(366).is_err());
        assert_eq!(validate_extension(7), Ok(7));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration(" 1h "), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("0m"), None);
        assert_eq!(parse_duration("1441m"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("m"), None);
    }
}
