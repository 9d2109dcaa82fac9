//! Score sanitization.
//!
//! Stored trait scores may come back from storage out of range or non-finite.
//! These helpers recover them locally instead of surfacing an error.

/// Returns true when `value` is finite and within [0, 1].
pub fn is_unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Clamps a score into [0, 1]. NaN falls back to `baseline`.
pub fn sanitize_score(value: f64, baseline: f64) -> f64 {
    if value.is_nan() {
        baseline.clamp(0.0, 1.0)
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn variance(values: &[f64]) -> Option<f64> {
    let avg = mean(values)?;
    Some(values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(sanitize_score(1.7, 0.5), 1.0);
        assert_eq!(sanitize_score(-0.2, 0.5), 0.0);
        assert_eq!(sanitize_score(f64::INFINITY, 0.5), 1.0);
        assert_eq!(sanitize_score(f64::NEG_INFINITY, 0.5), 0.0);
    }

    #[test]
    fn nan_falls_back_to_baseline() {
        assert_eq!(sanitize_score(f64::NAN, 0.5), 0.5);
    }

    #[test]
    fn unit_interval_check() {
        assert!(is_unit_interval(0.0));
        assert!(is_unit_interval(1.0));
        assert!(!is_unit_interval(1.0001));
        assert!(!is_unit_interval(f64::NAN));
    }

    #[test]
    fn variance_of_constant_values_is_zero() {
        assert_eq!(variance(&[0.4, 0.4, 0.4]), Some(0.0));
        assert_eq!(variance(&[]), None);
    }
}
