use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::personalization::config::PersonalizationConfig;
use crate::personalization::difficulty::EffectivenessRecord;
use crate::personalization::directive::{self, DirectiveInputs, PersonalizationDirective};
use crate::personalization::error::{PersonalizationError, Result};
use crate::personalization::misconception::{self, MisconceptionProgress, Transition};
use crate::personalization::sanitize::is_unit_interval;
use crate::personalization::trait_update::{self, TraitUpdateReport};
use crate::personalization::types::{
    DifficultyLevel, MisconceptionRecords, QuizSubmission, Topic, TraitProfile,
    TraitUpdateEvidence,
};

struct LearnerState {
    profile: TraitProfile,
    misconceptions: MisconceptionRecords,
    history: VecDeque<EffectivenessRecord>,
    version: u64,
    last_sequence: u64,
    recent_submissions: VecDeque<String>,
}

impl LearnerState {
    fn new(profile: TraitProfile) -> Self {
        Self {
            profile,
            misconceptions: MisconceptionRecords::new(),
            history: VecDeque::new(),
            version: 0,
            last_sequence: 0,
            recent_submissions: VecDeque::new(),
        }
    }

    fn snapshot(&self, learner_id: &str) -> LearnerSnapshot {
        LearnerSnapshot {
            learner_id: learner_id.to_string(),
            profile: self.profile.clone(),
            misconceptions: self.misconceptions.clone(),
            history: self.history.iter().cloned().collect(),
            version: self.version,
            last_sequence: self.last_sequence,
        }
    }

    fn remember_submission(&mut self, submission_id: &str, window: usize) {
        if window == 0 {
            return;
        }
        self.recent_submissions.push_back(submission_id.to_string());
        while self.recent_submissions.len() > window {
            self.recent_submissions.pop_front();
        }
    }
}

/// Point-in-time copy of one learner's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub learner_id: String,
    pub profile: TraitProfile,
    pub misconceptions: MisconceptionRecords,
    pub history: Vec<EffectivenessRecord>,
    pub version: u64,
    pub last_sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedSubmission {
    pub sequence: u64,
    pub version: u64,
    pub report: TraitUpdateReport,
    /// One entry per tagged response, in response order.
    pub transitions: Vec<(String, Transition)>,
}

impl AppliedSubmission {
    pub fn resolved_ids(&self) -> Vec<&str> {
        self.ids_with(Transition::Resolved)
    }

    pub fn reopened_ids(&self) -> Vec<&str> {
        self.ids_with(Transition::Reopened)
    }

    fn ids_with(&self, wanted: Transition) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|(_, t)| *t == wanted)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Applied(AppliedSubmission),
    Duplicate { submission_id: String, version: u64 },
}

impl SubmissionOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// In-memory owner of every learner's profile and misconception state.
///
/// The learner map lock is held only long enough to find the learner; all work
/// happens under that learner's own mutex, so one learner's submissions are
/// serialized while different learners proceed in parallel.
pub struct PersonalizationEngine {
    config: RwLock<PersonalizationConfig>,
    learners: RwLock<HashMap<String, Arc<Mutex<LearnerState>>>>,
}

impl PersonalizationEngine {
    pub fn new(config: PersonalizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            learners: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> PersonalizationConfig {
        self.config.read().clone()
    }

    pub fn reload_config(&self, config: PersonalizationConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = config;
        tracing::info!("personalization config reloaded");
        Ok(())
    }

    pub fn learner_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.learners.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_enrolled(&self, learner_id: &str) -> bool {
        self.learners.read().contains_key(learner_id)
    }

    /// Registers a learner with the profile produced by the initial assessment.
    pub fn enroll(&self, learner_id: &str, initial: TraitProfile) -> Result<LearnerSnapshot> {
        validate_learner_id(learner_id)?;
        let baseline = self.config.read().baseline_score;

        let mut learners = self.learners.write();
        if learners.contains_key(learner_id) {
            return Err(PersonalizationError::AlreadyEnrolled(learner_id.to_string()));
        }
        let state = LearnerState::new(initial.sanitized(baseline));
        let snapshot = state.snapshot(learner_id);
        learners.insert(learner_id.to_string(), Arc::new(Mutex::new(state)));

        tracing::info!(learner_id = %learner_id, traits = snapshot.profile.len(), "learner enrolled");
        Ok(snapshot)
    }

    /// Like [`enroll`](Self::enroll), discarding any existing state for the learner.
    pub fn enroll_or_replace(&self, learner_id: &str, initial: TraitProfile) -> Result<LearnerSnapshot> {
        validate_learner_id(learner_id)?;
        let baseline = self.config.read().baseline_score;
        let state = LearnerState::new(initial.sanitized(baseline));
        let snapshot = state.snapshot(learner_id);

        let replaced = self
            .learners
            .write()
            .insert(learner_id.to_string(), Arc::new(Mutex::new(state)))
            .is_some();

        tracing::info!(learner_id = %learner_id, replaced, "learner enrolled");
        Ok(snapshot)
    }

    pub fn remove(&self, learner_id: &str) -> bool {
        self.learners.write().remove(learner_id).is_some()
    }

    pub fn snapshot(&self, learner_id: &str) -> Result<LearnerSnapshot> {
        let learner = self.learner(learner_id)?;
        let state = learner.lock();
        Ok(state.snapshot(learner_id))
    }

    /// Applies one quiz submission. Trait and misconception updates are computed
    /// on copies and committed together, so a rejected submission leaves no trace.
    pub fn submit(&self, learner_id: &str, submission: &QuizSubmission) -> Result<SubmissionOutcome> {
        if submission.submission_id.trim().is_empty() {
            return Err(PersonalizationError::invalid_input("submission_id must not be empty"));
        }
        let config = self.config();
        let learner = self.learner(learner_id)?;
        let mut state = learner.lock();

        if state
            .recent_submissions
            .iter()
            .any(|id| id == &submission.submission_id)
        {
            tracing::warn!(
                learner_id = %learner_id,
                submission_id = %submission.submission_id,
                "duplicate submission ignored"
            );
            return Ok(SubmissionOutcome::Duplicate {
                submission_id: submission.submission_id.clone(),
                version: state.version,
            });
        }

        let sequence = state.last_sequence + 1;
        let (report, records, transitions) =
            match apply_responses(&state, submission, sequence, &config) {
                Ok(applied) => applied,
                Err(err) => {
                    tracing::warn!(
                        learner_id = %learner_id,
                        submission_id = %submission.submission_id,
                        error = %err,
                        "submission rejected"
                    );
                    return Err(err);
                }
            };
        for (id, transition) in &transitions {
            match transition {
                Transition::Resolved => {
                    tracing::info!(learner_id = %learner_id, misconception = %id, sequence, "misconception resolved");
                }
                Transition::Reopened => {
                    tracing::info!(learner_id = %learner_id, misconception = %id, sequence, "misconception reopened");
                }
                _ => {}
            }
        }

        state.profile = report.profile.clone();
        state.misconceptions = records;
        state.last_sequence = sequence;
        state.version += 1;
        state.remember_submission(&submission.submission_id, config.engine.dedupe_window);

        tracing::info!(
            learner_id = %learner_id,
            sequence,
            version = state.version,
            responses = submission.responses.len(),
            "submission applied"
        );

        Ok(SubmissionOutcome::Applied(AppliedSubmission {
            sequence,
            version: state.version,
            report,
            transitions,
        }))
    }

    /// Optimistic write-back of a profile computed outside the engine.
    pub fn commit_profile(&self, learner_id: &str, expected_version: u64, profile: TraitProfile) -> Result<u64> {
        let baseline = self.config.read().baseline_score;
        let learner = self.learner(learner_id)?;
        let mut state = learner.lock();

        if state.version != expected_version {
            tracing::warn!(
                learner_id = %learner_id,
                expected = expected_version,
                actual = state.version,
                "profile commit rejected"
            );
            return Err(PersonalizationError::VersionConflict {
                learner_id: learner_id.to_string(),
                expected: expected_version,
                actual: state.version,
            });
        }

        state.profile = profile.sanitized(baseline);
        state.version += 1;
        Ok(state.version)
    }

    /// Builds the directive for the learner's next batch and counts the
    /// misconceptions it addresses as targeted.
    pub fn plan_next_batch(
        &self,
        learner_id: &str,
        topics: &[Topic],
        batch_size: Option<usize>,
        ratio: Option<f64>,
    ) -> Result<PersonalizationDirective> {
        let config = self.config();
        let learner = self.learner(learner_id)?;
        let mut state = learner.lock();

        let history: Vec<EffectivenessRecord> = state.history.iter().cloned().collect();
        let mut inputs = DirectiveInputs::new(&state.profile, topics, &state.misconceptions);
        inputs.batch_size = batch_size;
        inputs.ratio = ratio;
        inputs.history = &history;
        let planned = directive::build(inputs, &config)?;

        if !planned.misconceptions_to_address().is_empty() {
            state.misconceptions =
                misconception::mark_targeted(&state.misconceptions, planned.misconceptions_to_address());
            state.version += 1;
        }

        tracing::info!(
            learner_id = %learner_id,
            difficulty = %planned.difficulty(),
            misconceptions = planned.misconceptions_to_address().len(),
            "next batch planned"
        );
        Ok(planned)
    }

    /// Appends one effectiveness observation, keeping only the most recent
    /// `engine.history_capacity` records.
    pub fn record_effectiveness(
        &self,
        learner_id: &str,
        trait_name: &str,
        difficulty_used: DifficultyLevel,
        score_before: f64,
        score_after: f64,
        questions_count: usize,
    ) -> Result<EffectivenessRecord> {
        for (name, score) in [("score_before", score_before), ("score_after", score_after)] {
            if !is_unit_interval(score) {
                return Err(PersonalizationError::invalid_input(format!(
                    "{name} must be within [0, 1], got {score}"
                )));
            }
        }
        let config = self.config();
        let learner = self.learner(learner_id)?;
        let mut state = learner.lock();

        let record = EffectivenessRecord::observe(
            trait_name,
            difficulty_used,
            score_before,
            score_after,
            questions_count,
            state.last_sequence,
            &config.history,
        );
        state.history.push_back(record.clone());
        while state.history.len() > config.engine.history_capacity {
            state.history.pop_front();
        }

        tracing::debug!(
            learner_id = %learner_id,
            trait_name,
            effectiveness = ?record.effectiveness,
            "effectiveness recorded"
        );
        Ok(record)
    }

    pub fn misconception_progress(&self, learner_id: &str, topic: Option<&str>) -> Result<MisconceptionProgress> {
        let config = self.config();
        let learner = self.learner(learner_id)?;
        let state = learner.lock();
        Ok(misconception::progress(&state.misconceptions, topic, &config.misconception))
    }

    fn learner(&self, learner_id: &str) -> Result<Arc<Mutex<LearnerState>>> {
        self.learners
            .read()
            .get(learner_id)
            .cloned()
            .ok_or_else(|| PersonalizationError::UnknownLearner(learner_id.to_string()))
    }
}

type AppliedResponses = (TraitUpdateReport, MisconceptionRecords, Vec<(String, Transition)>);

/// Computes the trait and misconception updates on copies. Every response is
/// validated before the first update.
fn apply_responses(
    state: &LearnerState,
    submission: &QuizSubmission,
    sequence: u64,
    config: &PersonalizationConfig,
) -> Result<AppliedResponses> {
    for response in &submission.responses {
        response.validate()?;
    }

    let evidence: Vec<TraitUpdateEvidence> = submission
        .responses
        .iter()
        .map(|response| response.evidence.clone())
        .collect();
    let report = trait_update::apply_submission(&state.profile, &evidence, config)?;

    let mut records = state.misconceptions.clone();
    let mut transitions = Vec::new();
    for response in &submission.responses {
        let observation = response.observation(Some(sequence));
        let outcome = misconception::track(&records, &observation, &config.misconception)?;
        records = outcome.records;
        if let Some(id) = observation.misconception_id {
            transitions.push((id, outcome.transition));
        }
    }
    Ok((report, records, transitions))
}

fn validate_learner_id(learner_id: &str) -> Result<()> {
    if learner_id.trim().is_empty() {
        return Err(PersonalizationError::invalid_input("learner_id must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::personalization::types::QuizResponse;

    fn response(trait_name: &str, correct: bool) -> QuizResponse {
        QuizResponse::new(TraitUpdateEvidence {
            relevance: BTreeMap::from([(trait_name.to_string(), 1.0)]),
            correctness: correct,
            confidence: 0.7,
            reasoning_quality: 0.6,
        })
    }

    fn engine() -> PersonalizationEngine {
        PersonalizationEngine::new(PersonalizationConfig::default()).unwrap()
    }

    #[test]
    fn enroll_twice_is_rejected() {
        let engine = engine();
        engine.enroll("u1", TraitProfile::new()).unwrap();
        let err = engine.enroll("u1", TraitProfile::new()).unwrap_err();
        assert!(matches!(err, PersonalizationError::AlreadyEnrolled(_)));
        engine.enroll_or_replace("u1", TraitProfile::new()).unwrap();
    }

    #[test]
    fn unknown_learner_is_reported() {
        let err = engine().snapshot("ghost").unwrap_err();
        assert!(matches!(err, PersonalizationError::UnknownLearner(_)));
    }

    #[test]
    fn sequences_increase_per_learner() {
        let engine = engine();
        engine.enroll("u1", TraitProfile::new()).unwrap();
        for (i, id) in ["s1", "s2", "s3"].iter().enumerate() {
            let outcome = engine
                .submit(
                    "u1",
                    &QuizSubmission {
                        submission_id: id.to_string(),
                        responses: vec![response("x", true)],
                    },
                )
                .unwrap();
            match outcome {
                SubmissionOutcome::Applied(applied) => assert_eq!(applied.sequence, i as u64 + 1),
                SubmissionOutcome::Duplicate { .. } => panic!("unexpected duplicate"),
            }
        }
        assert_eq!(engine.snapshot("u1").unwrap().last_sequence, 3);
    }

    #[test]
    fn history_is_bounded() {
        let mut config = PersonalizationConfig::default();
        config.engine.history_capacity = 2;
        let engine = PersonalizationEngine::new(config).unwrap();
        engine.enroll("u1", TraitProfile::new()).unwrap();
        for _ in 0..5 {
            engine
                .record_effectiveness("u1", "x", DifficultyLevel::Medium, 0.5, 0.6, 10)
                .unwrap();
        }
        assert_eq!(engine.snapshot("u1").unwrap().history.len(), 2);
    }

    #[test]
    fn effectiveness_scores_outside_unit_interval_are_rejected() {
        let engine = engine();
        engine.enroll("u1", TraitProfile::new()).unwrap();
        for (before, after) in [(f64::NAN, 0.5), (0.5, 1.2), (-0.1, 0.4)] {
            let err = engine
                .record_effectiveness("u1", "x", DifficultyLevel::Medium, before, after, 10)
                .unwrap_err();
            assert!(err.is_invalid_input());
        }
        assert!(engine.snapshot("u1").unwrap().history.is_empty());
    }
}
