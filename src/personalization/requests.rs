//! JSON request shapes accepted at the library boundary.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::personalization::config::PersonalizationConfig;
use crate::personalization::difficulty::{self, DifficultyRecommendation, EffectivenessRecord};
use crate::personalization::directive::{self, DirectiveInputs, PersonalizationDirective};
use crate::personalization::error::{PersonalizationError, Result};
use crate::personalization::misconception::{self, Transition};
use crate::personalization::targeting;
use crate::personalization::trait_update;
use crate::personalization::types::{
    MisconceptionObservation, MisconceptionRecords, TargetMix, Topic, TraitProfile,
    TraitUpdateEvidence,
};

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T> {
    Ok(serde_json::from_str(payload)?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub profile: TraitProfile,
    pub evidence: TraitUpdateEvidence,
}

impl UpdateRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        decode(payload)
    }

    pub fn execute(&self, config: &PersonalizationConfig) -> Result<TraitProfile> {
        trait_update::update(&self.profile, &self.evidence, config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub records: MisconceptionRecords,
    pub response: MisconceptionObservation,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackResponse {
    pub records: MisconceptionRecords,
    pub transition: Transition,
}

impl TrackRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        let mut request: Self = decode(payload)?;
        request.records = misconception::keyed(request.records);
        Ok(request)
    }

    pub fn execute(&self, config: &PersonalizationConfig) -> Result<TrackResponse> {
        let outcome = misconception::track(&self.records, &self.response, &config.misconception)?;
        Ok(TrackResponse {
            records: outcome.records,
            transition: outcome.transition,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrateRequest {
    #[serde(default)]
    pub profile: TraitProfile,
    #[serde(default)]
    pub history: Vec<EffectivenessRecord>,
}

impl CalibrateRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        decode(payload)
    }

    pub fn execute(&self, config: &PersonalizationConfig) -> DifficultyRecommendation {
        difficulty::recommend(&self.profile, &self.history, config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub profile: TraitProfile,
    #[serde(default)]
    pub topics: Vec<Topic>,
    pub batch_size: Option<i64>,
    pub ratio: Option<f64>,
}

impl SelectRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        decode(payload)
    }

    pub fn execute(&self, config: &PersonalizationConfig) -> Result<TargetMix> {
        let batch_size = batch_size_from(self.batch_size, config)?;
        let ratio = self.ratio.unwrap_or(config.targeting.ratio);
        targeting::select(&self.profile, &self.topics, batch_size, ratio, config)
    }
}

/// Everything needed to build a directive in one call.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub profile: TraitProfile,
    #[serde(default)]
    pub topics: Vec<Topic>,
    pub batch_size: Option<i64>,
    pub ratio: Option<f64>,
    #[serde(default)]
    pub misconceptions: MisconceptionRecords,
    #[serde(default)]
    pub history: Vec<EffectivenessRecord>,
}

impl PlanRequest {
    pub fn from_json(payload: &str) -> Result<Self> {
        let mut request: Self = decode(payload)?;
        request.misconceptions = misconception::keyed(request.misconceptions);
        Ok(request)
    }

    pub fn execute(&self, config: &PersonalizationConfig) -> Result<PersonalizationDirective> {
        let mut inputs = DirectiveInputs::new(&self.profile, &self.topics, &self.misconceptions);
        inputs.batch_size = Some(batch_size_from(self.batch_size, config)?);
        inputs.ratio = self.ratio;
        inputs.history = &self.history;
        directive::build(inputs, config)
    }
}

// Negative sizes arrive as JSON integers and must surface as input errors,
// not as deserialization failures of an unsigned field.
fn batch_size_from(raw: Option<i64>, config: &PersonalizationConfig) -> Result<usize> {
    match raw {
        None => Ok(config.targeting.default_batch_size),
        Some(n) if n <= 0 => Err(PersonalizationError::invalid_input(format!(
            "batch_size must be positive, got {n}"
        ))),
        Some(n) => usize::try_from(n)
            .map_err(|_| PersonalizationError::invalid_input(format!("batch_size {n} is too large"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personalization::types::DifficultyLevel;

    #[test]
    fn update_request_round_trips_boundary_shape() {
        let request = UpdateRequest::from_json(
            r#"{"profile": {"x": 0.5},
                "evidence": {"relevance": {"x": 1.0}, "correctness": true,
                             "confidence": 0.9, "reasoning_quality": 0.8}}"#,
        )
        .unwrap();
        let profile = request.execute(&PersonalizationConfig::default()).unwrap();
        assert!(profile.get("x").unwrap() > 0.5);
    }

    #[test]
    fn missing_correctness_is_invalid_input() {
        let err = UpdateRequest::from_json(
            r#"{"profile": {}, "evidence": {"relevance": {}, "confidence": 0.5, "reasoning_quality": 0.5}}"#,
        )
        .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn track_request_accepts_minimal_records() {
        let request = TrackRequest::from_json(
            r#"{"records": {"m1": {"occurrences": 2, "streak": 2, "resolved": false}},
                "response": {"misconception_id": "m1", "correctness": true}}"#,
        )
        .unwrap();
        let response = request.execute(&PersonalizationConfig::default()).unwrap();
        assert_eq!(response.transition, Transition::Resolved);
        assert!(response.records["m1"].resolved);
        assert_eq!(response.records["m1"].occurrences, 3);
    }

    #[test]
    fn calibrate_request_uses_table() {
        let request = CalibrateRequest::from_json(r#"{"profile": {"a": 0.9, "b": 0.85}}"#).unwrap();
        assert_eq!(request.execute(&PersonalizationConfig::default()).level, DifficultyLevel::Hard);
    }

    #[test]
    fn non_positive_batch_size_is_rejected() {
        let request = SelectRequest::from_json(
            r#"{"profile": {"a": 0.3}, "topics": [{"id": "t", "associated_trait": "a"}], "batch_size": -2}"#,
        )
        .unwrap();
        let err = request.execute(&PersonalizationConfig::default()).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn plan_request_defaults_batch_size() {
        let request = PlanRequest::from_json(
            r#"{"profile": {"a": 0.3, "b": 0.9},
                "topics": [{"id": "t1", "associated_trait": "a"}, {"id": "t2", "associated_trait": "b"}]}"#,
        )
        .unwrap();
        let directive = request.execute(&PersonalizationConfig::default()).unwrap();
        assert_eq!(directive.target_mix().len(), 10);
    }

    #[test]
    fn plan_request_addresses_misconceptions_by_key() {
        let request = PlanRequest::from_json(
            r#"{"profile": {"a": 0.3},
                "topics": [{"id": "t1", "associated_trait": "a"}],
                "misconceptions": {
                    "sign-error": {"occurrences": 1, "streak": 0, "resolved": false},
                    "units": {"occurrences": 2, "streak": 1, "resolved": false}
                }}"#,
        )
        .unwrap();
        let directive = request.execute(&PersonalizationConfig::default()).unwrap();
        assert_eq!(directive.misconceptions_to_address(), ["units", "sign-error"]);
    }

    #[test]
    fn track_request_returns_keyed_records() {
        let request = TrackRequest::from_json(
            r#"{"records": {"m1": {"occurrences": 1, "streak": 0, "resolved": false},
                            "m2": {"occurrences": 1, "streak": 1, "resolved": false}},
                "response": {"misconception_id": "m1", "correctness": false}}"#,
        )
        .unwrap();
        let response = request.execute(&PersonalizationConfig::default()).unwrap();
        assert_eq!(response.records["m2"].id, "m2");
        assert_eq!(response.records["m1"].id, "m1");
    }

    #[test]
    fn blank_misconception_id_in_track_request_is_invalid() {
        let request = TrackRequest::from_json(
            r#"{"records": {}, "response": {"misconception_id": " ", "correctness": true}}"#,
        )
        .unwrap();
        let err = request.execute(&PersonalizationConfig::default()).unwrap_err();
        assert!(err.is_invalid_input());
    }
}
