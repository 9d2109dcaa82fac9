use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::personalization::error::{PersonalizationError, Result};
use crate::personalization::sanitize::{is_unit_interval, mean, sanitize_score, variance};

pub const DEFAULT_BASELINE: f64 = 0.5;

/// Per-learner mastery scores keyed by trait name.
///
/// The trait vocabulary is open: new names may show up in evidence at any time.
/// Ordered by name so every derived ranking is independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitProfile {
    scores: BTreeMap<String, f64>,
}

impl TraitProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scores<K, I>(scores: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut profile = Self::new();
        for (name, score) in scores {
            profile.set(name, score);
        }
        profile
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied()
    }

    pub fn score_or(&self, name: &str, baseline: f64) -> f64 {
        self.get(name).unwrap_or(baseline)
    }

    pub fn set(&mut self, name: impl Into<String>, score: f64) {
        self.scores
            .insert(name.into(), sanitize_score(score, DEFAULT_BASELINE));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scores.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(name, score)| (name.as_str(), *score))
    }

    pub fn trait_names(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(String::as_str)
    }

    /// Copy of the profile with every score clamped into [0, 1].
    pub fn sanitized(&self, baseline: f64) -> Self {
        Self {
            scores: self
                .scores
                .iter()
                .map(|(name, score)| (name.clone(), sanitize_score(*score, baseline)))
                .collect(),
        }
    }

    pub fn mean(&self) -> Option<f64> {
        mean(&self.values())
    }

    pub fn variance(&self) -> Option<f64> {
        variance(&self.values())
    }

    /// Traits weakest first; equal scores keep lexicographic name order.
    pub fn ranked_ascending(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Traits strongest first; equal scores keep lexicographic name order.
    pub fn ranked_descending(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    fn values(&self) -> Vec<f64> {
        self.scores.values().copied().collect()
    }
}

/// Evidence extracted from a single quiz response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitUpdateEvidence {
    /// How strongly the question exercises each trait, in [0, 1].
    pub relevance: BTreeMap<String, f64>,
    pub correctness: bool,
    pub confidence: f64,
    pub reasoning_quality: f64,
}

impl TraitUpdateEvidence {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in &self.relevance {
            if name.trim().is_empty() {
                return Err(PersonalizationError::invalid_input(
                    "relevance map contains an empty trait name",
                ));
            }
            if !is_unit_interval(*weight) {
                return Err(PersonalizationError::invalid_input(format!(
                    "relevance weight for '{name}' must be within [0, 1], got {weight}"
                )));
            }
        }
        if !is_unit_interval(self.confidence) {
            return Err(PersonalizationError::invalid_input(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if !is_unit_interval(self.reasoning_quality) {
            return Err(PersonalizationError::invalid_input(format!(
                "reasoning_quality must be within [0, 1], got {}",
                self.reasoning_quality
            )));
        }
        Ok(())
    }

    pub fn relevant_traits(&self) -> impl Iterator<Item = (&str, f64)> {
        self.relevance
            .iter()
            .filter(|(_, weight)| **weight > 0.0)
            .map(|(name, weight)| (name.as_str(), *weight))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::Expert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Expert => "expert",
        }
    }

    pub fn harder(&self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            Self::Medium => Self::Hard,
            _ => Self::Expert,
        }
    }

    pub fn easier(&self) -> Self {
        match self {
            Self::Expert => Self::Hard,
            Self::Hard => Self::Medium,
            _ => Self::Easy,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate topic and the trait it mainly exercises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub associated_trait: String,
}

impl Topic {
    pub fn new(id: impl Into<String>, associated_trait: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            associated_trait: associated_trait.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSlot {
    pub topic: String,
    pub targeted_trait: String,
    pub is_weakness_focused: bool,
}

/// One entry per question slot in the next batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetMix {
    slots: Vec<TargetSlot>,
}

impl TargetMix {
    pub fn from_slots(slots: Vec<TargetSlot>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[TargetSlot] {
        &self.slots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TargetSlot> {
        self.slots.iter()
    }

    pub fn weakness_focused_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_weakness_focused).count()
    }

    pub fn into_slots(self) -> Vec<TargetSlot> {
        self.slots
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Per-learner state of one tagged misconception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconceptionRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub related_trait: Option<String>,
    pub occurrences: u32,
    pub streak: u32,
    pub resolved: bool,
    #[serde(default)]
    pub targeted_question_count: u32,
    #[serde(default)]
    pub first_seen: Option<u64>,
    #[serde(default)]
    pub last_seen: Option<u64>,
    #[serde(default)]
    pub resolved_at: Option<u64>,
}

impl MisconceptionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            topic: None,
            severity: Severity::default(),
            related_trait: None,
            occurrences: 0,
            streak: 0,
            resolved: false,
            targeted_question_count: 0,
            first_seen: None,
            last_seen: None,
            resolved_at: None,
        }
    }
}

/// Misconception records keyed by misconception id.
pub type MisconceptionRecords = BTreeMap<String, MisconceptionRecord>;

/// Optional metadata attached to a misconception tag the first time it is seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconceptionDetails {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub related_trait: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconceptionObservation {
    #[serde(default)]
    pub misconception_id: Option<String>,
    pub correctness: bool,
    #[serde(default)]
    pub details: MisconceptionDetails,
    /// Submission sequence the observation belongs to, if known.
    #[serde(default)]
    pub sequence: Option<u64>,
}

impl MisconceptionObservation {
    pub fn tagged(id: impl Into<String>, correctness: bool) -> Self {
        Self {
            misconception_id: Some(id.into()),
            correctness,
            details: MisconceptionDetails::default(),
            sequence: None,
        }
    }

    pub fn untagged(correctness: bool) -> Self {
        Self {
            misconception_id: None,
            correctness,
            details: MisconceptionDetails::default(),
            sequence: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_misconception_id(self.misconception_id.as_deref())
    }
}

fn validate_misconception_id(id: Option<&str>) -> Result<()> {
    match id {
        Some(id) if id.trim().is_empty() => Err(PersonalizationError::invalid_input(
            "misconception_id must not be blank",
        )),
        _ => Ok(()),
    }
}

/// A single answered question inside a quiz submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResponse {
    #[serde(flatten)]
    pub evidence: TraitUpdateEvidence,
    #[serde(default)]
    pub misconception_id: Option<String>,
    #[serde(default)]
    pub misconception_details: MisconceptionDetails,
}

impl QuizResponse {
    pub fn new(evidence: TraitUpdateEvidence) -> Self {
        Self {
            evidence,
            misconception_id: None,
            misconception_details: MisconceptionDetails::default(),
        }
    }

    pub fn with_misconception(mut self, id: impl Into<String>) -> Self {
        self.misconception_id = Some(id.into());
        self
    }

    /// Evidence ranges plus a non-blank misconception tag.
    pub fn validate(&self) -> Result<()> {
        self.evidence.validate()?;
        validate_misconception_id(self.misconception_id.as_deref())
    }

    pub fn observation(&self, sequence: Option<u64>) -> MisconceptionObservation {
        MisconceptionObservation {
            misconception_id: self.misconception_id.clone(),
            correctness: self.evidence.correctness,
            details: self.misconception_details.clone(),
            sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub submission_id: String,
    pub responses: Vec<QuizResponse>,
}
