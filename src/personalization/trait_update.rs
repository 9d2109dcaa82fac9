//! Trait Update Engine
//!
//! Revises trait scores from quiz evidence with a hybrid blend of:
//! - a Bayesian Knowledge Tracing posterior (slip/guess parameterized)
//! - the externally scored reasoning quality
//! - a confidence-calibration signal
//!
//! The blend is applied toward the old score in proportion to how relevant the
//! question is to each trait. Inputs are never mutated; a new profile is returned.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::personalization::config::{BktParams, PersonalizationConfig};
use crate::personalization::error::Result;
use crate::personalization::sanitize::sanitize_score;
use crate::personalization::types::{TraitProfile, TraitUpdateEvidence};

/// Posterior mastery after observing one response.
pub fn bkt_posterior(prior: f64, correct: bool, params: &BktParams) -> f64 {
    let (numerator, denominator) = if correct {
        let num = prior * (1.0 - params.p_slip);
        (num, num + (1.0 - prior) * params.p_guess)
    } else {
        let num = prior * params.p_slip;
        (num, num + (1.0 - prior) * (1.0 - params.p_guess))
    };

    if denominator <= f64::EPSILON {
        return prior;
    }
    (numerator / denominator).clamp(0.0, 1.0)
}

/// 1 when stated confidence matches the outcome exactly, 0 when fully inverted.
pub fn calibration_signal(confidence: f64, correct: bool) -> f64 {
    let outcome = if correct { 1.0 } else { 0.0 };
    1.0 - (confidence - outcome).abs()
}

/// Target score for one trait before relevance interpolation.
pub fn blended_score(prior: f64, evidence: &TraitUpdateEvidence, config: &PersonalizationConfig) -> f64 {
    let weights = &config.blend;
    let posterior = bkt_posterior(prior, evidence.correctness, &config.bkt);
    let calibration = calibration_signal(evidence.confidence, evidence.correctness);

    (weights.bayesian * posterior
        + weights.reasoning * evidence.reasoning_quality
        + weights.calibration * calibration)
        .clamp(0.0, 1.0)
}

/// Applies one response worth of evidence and returns the revised profile.
///
/// Traits with zero relevance are untouched. Traits named by the evidence but
/// missing from the profile start at the configured baseline.
pub fn update(
    profile: &TraitProfile,
    evidence: &TraitUpdateEvidence,
    config: &PersonalizationConfig,
) -> Result<TraitProfile> {
    evidence.validate()?;
    Ok(apply_validated(
        profile.sanitized(config.baseline_score),
        evidence,
        config,
    ))
}

fn apply_validated(
    mut profile: TraitProfile,
    evidence: &TraitUpdateEvidence,
    config: &PersonalizationConfig,
) -> TraitProfile {
    for (name, relevance) in evidence.relevant_traits() {
        let old = profile.score_or(name, config.baseline_score);
        let target = blended_score(old, evidence, config);
        let revised = old + relevance * (target - old);
        profile.set(name, sanitize_score(revised, config.baseline_score));
    }
    profile
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitChange {
    pub old: f64,
    pub new: f64,
    pub delta: f64,
    pub evidence_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitUpdateReport {
    pub profile: TraitProfile,
    pub changes: BTreeMap<String, TraitChange>,
}

impl TraitUpdateReport {
    pub fn changed_traits(&self) -> impl Iterator<Item = (&str, &TraitChange)> {
        self.changes
            .iter()
            .filter(|(_, change)| change.evidence_count > 0)
            .map(|(name, change)| (name.as_str(), change))
    }
}

/// Folds a whole quiz worth of evidence into the profile, in order.
///
/// Every record is validated before the first update, so a single malformed
/// response rejects the submission without any partial movement.
pub fn apply_submission(
    profile: &TraitProfile,
    responses: &[TraitUpdateEvidence],
    config: &PersonalizationConfig,
) -> Result<TraitUpdateReport> {
    for evidence in responses {
        evidence.validate()?;
    }

    let start = profile.sanitized(config.baseline_score);
    let mut evidence_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut current = start.clone();

    for evidence in responses {
        for (name, _) in evidence.relevant_traits() {
            *evidence_counts.entry(name.to_string()).or_default() += 1;
        }
        current = apply_validated(current, evidence, config);
    }

    let changes = current
        .iter()
        .map(|(name, new)| {
            let old = start.score_or(name, config.baseline_score);
            let change = TraitChange {
                old,
                new,
                delta: new - old,
                evidence_count: evidence_counts.get(name).copied().unwrap_or(0),
            };
            (name.to_string(), change)
        })
        .collect();

    Ok(TraitUpdateReport {
        profile: current,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(trait_name: &str, relevance: f64, correct: bool, confidence: f64, reasoning: f64) -> TraitUpdateEvidence {
        TraitUpdateEvidence {
            relevance: BTreeMap::from([(trait_name.to_string(), relevance)]),
            correctness: correct,
            confidence,
            reasoning_quality: reasoning,
        }
    }

    #[test]
    fn posterior_rises_on_correct_and_falls_on_incorrect() {
        let params = BktParams::default();
        let up = bkt_posterior(0.5, true, &params);
        let down = bkt_posterior(0.5, false, &params);
        assert!((up - 0.45 / 0.55).abs() < 1e-12);
        assert!((down - 0.05 / 0.45).abs() < 1e-12);
    }

    #[test]
    fn posterior_survives_degenerate_parameters() {
        let params = BktParams {
            p_slip: 0.0,
            p_guess: 0.0,
        };
        assert_eq!(bkt_posterior(0.0, true, &params), 0.0);
        assert_eq!(bkt_posterior(1.0, false, &params), 1.0);
    }

    #[test]
    fn calibration_rewards_matching_confidence() {
        assert!((calibration_signal(0.9, true) - 0.9).abs() < 1e-12);
        assert!((calibration_signal(0.9, false) - 0.1).abs() < 1e-12);
        assert_eq!(calibration_signal(0.0, false), 1.0);
    }

    #[test]
    fn confident_correct_answer_raises_score() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.5)]);
        let updated = update(&profile, &evidence("x", 1.0, true, 0.9, 0.8), &config).unwrap();
        let x = updated.get("x").unwrap();
        assert!(x > 0.5, "expected increase, got {x}");
        assert!((x - 0.825909091).abs() < 1e-6);
    }

    #[test]
    fn relevance_scales_the_movement() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.5)]);
        let full = update(&profile, &evidence("x", 1.0, true, 0.9, 0.8), &config).unwrap();
        let half = update(&profile, &evidence("x", 0.5, true, 0.9, 0.8), &config).unwrap();
        let full_delta = full.get("x").unwrap() - 0.5;
        let half_delta = half.get("x").unwrap() - 0.5;
        assert!((half_delta - full_delta / 2.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_trait_starts_at_baseline() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.7)]);
        let updated = update(&profile, &evidence("curiosity", 1.0, false, 0.2, 0.1), &config).unwrap();
        assert_eq!(updated.get("x"), Some(0.7));
        let curiosity = updated.get("curiosity").unwrap();
        assert!(curiosity < 0.5);
    }

    #[test]
    fn zero_relevance_is_a_no_op() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.31)]);
        let updated = update(&profile, &evidence("x", 0.0, true, 1.0, 1.0), &config).unwrap();
        assert_eq!(updated, profile);
        let added = update(&profile, &evidence("y", 0.0, true, 1.0, 1.0), &config).unwrap();
        assert!(!added.contains("y"));
    }

    #[test]
    fn out_of_range_stored_scores_are_clamped_first() {
        let config = PersonalizationConfig::default();
        let profile: TraitProfile = serde_json::from_str(r#"{"x": 1.8, "y": -0.3}"#).unwrap();
        let updated = update(&profile, &evidence("x", 1.0, true, 1.0, 1.0), &config).unwrap();
        assert!(updated.get("x").unwrap() <= 1.0);
        assert_eq!(updated.get("y"), Some(0.0));
    }

    #[test]
    fn invalid_evidence_is_rejected() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.5)]);
        let err = update(&profile, &evidence("x", 1.0, true, 1.2, 0.5), &config).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn submission_reports_per_trait_changes() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.5), ("y", 0.6)]);
        let responses = vec![
            evidence("x", 1.0, true, 0.8, 0.7),
            evidence("x", 0.5, false, 0.9, 0.2),
        ];
        let report = apply_submission(&profile, &responses, &config).unwrap();

        let x = &report.changes["x"];
        assert_eq!(x.evidence_count, 2);
        assert!((x.delta - (x.new - x.old)).abs() < 1e-12);

        let y = &report.changes["y"];
        assert_eq!(y.evidence_count, 0);
        assert_eq!(y.delta, 0.0);
        assert_eq!(report.changed_traits().count(), 1);
    }

    #[test]
    fn submission_with_one_bad_response_changes_nothing() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.5)]);
        let responses = vec![
            evidence("x", 1.0, true, 0.8, 0.7),
            evidence("x", -0.1, false, 0.9, 0.2),
        ];
        assert!(apply_submission(&profile, &responses, &config).is_err());
    }

    #[test]
    fn empty_submission_is_a_no_op() {
        let config = PersonalizationConfig::default();
        let profile = TraitProfile::from_scores([("x", 0.5)]);
        let report = apply_submission(&profile, &[], &config).unwrap();
        assert_eq!(report.profile, profile);
    }
}
