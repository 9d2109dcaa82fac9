//! Personalization Directive Builder
//!
//! Composes calibration, targeting and misconception state into the payload
//! handed to the question-generation collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::personalization::config::PersonalizationConfig;
use crate::personalization::difficulty::{self, EffectivenessRecord};
use crate::personalization::error::Result;
use crate::personalization::misconception;
use crate::personalization::targeting;
use crate::personalization::types::{
    DifficultyLevel, MisconceptionRecords, TargetMix, Topic, TraitProfile,
};

#[derive(Debug, Clone, Copy)]
pub struct DirectiveInputs<'a> {
    pub profile: &'a TraitProfile,
    pub topics: &'a [Topic],
    pub batch_size: Option<usize>,
    pub ratio: Option<f64>,
    pub misconceptions: &'a MisconceptionRecords,
    pub history: &'a [EffectivenessRecord],
}

impl<'a> DirectiveInputs<'a> {
    pub fn new(profile: &'a TraitProfile, topics: &'a [Topic], misconceptions: &'a MisconceptionRecords) -> Self {
        Self {
            profile,
            topics,
            batch_size: None,
            ratio: None,
            misconceptions,
            history: &[],
        }
    }
}

/// Structured instructions for the next question batch. Built once, read once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationDirective {
    difficulty: DifficultyLevel,
    weak_traits: Vec<String>,
    strong_traits: Vec<String>,
    moderate_traits: Vec<String>,
    target_mix: TargetMix,
    misconceptions_to_address: Vec<String>,
    rationale: String,
    trait_levels: BTreeMap<String, DifficultyLevel>,
    difficulty_distribution: BTreeMap<DifficultyLevel, usize>,
    confidence: f64,
}

impl PersonalizationDirective {
    pub fn difficulty(&self) -> DifficultyLevel {
        self.difficulty
    }

    pub fn weak_traits(&self) -> &[String] {
        &self.weak_traits
    }

    pub fn strong_traits(&self) -> &[String] {
        &self.strong_traits
    }

    pub fn moderate_traits(&self) -> &[String] {
        &self.moderate_traits
    }

    pub fn target_mix(&self) -> &TargetMix {
        &self.target_mix
    }

    pub fn misconceptions_to_address(&self) -> &[String] {
        &self.misconceptions_to_address
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn trait_levels(&self) -> &BTreeMap<String, DifficultyLevel> {
        &self.trait_levels
    }

    pub fn difficulty_distribution(&self) -> &BTreeMap<DifficultyLevel, usize> {
        &self.difficulty_distribution
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn into_json(self) -> serde_json::Result<String> {
        serde_json::to_string(&self)
    }

    pub fn into_json_value(self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

pub fn build(inputs: DirectiveInputs<'_>, config: &PersonalizationConfig) -> Result<PersonalizationDirective> {
    let batch_size = inputs
        .batch_size
        .unwrap_or(config.targeting.default_batch_size);
    let ratio = inputs.ratio.unwrap_or(config.targeting.ratio);

    let target_mix = targeting::select(inputs.profile, inputs.topics, batch_size, ratio, config)?;
    let recommendation = difficulty::recommend(inputs.profile, inputs.history, config);
    let analysis = targeting::analyze(inputs.profile, config);

    let misconceptions_to_address: Vec<String> =
        misconception::unresolved(inputs.misconceptions, inputs.topics, &config.misconception)
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();

    let difficulty_distribution = difficulty::difficulty_distribution(
        recommendation.level,
        recommendation.weak_traits.len(),
        batch_size,
    );

    let focus = if recommendation.weak_traits.is_empty() {
        "the lowest-ranked traits".to_string()
    } else {
        recommendation
            .weak_traits
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    let rationale = format!(
        "difficulty {}: {}. {} of {} questions focus on {}. {} unresolved misconception(s) to address.",
        recommendation.level,
        recommendation.reasoning,
        target_mix.weakness_focused_count(),
        target_mix.len(),
        focus,
        misconceptions_to_address.len()
    );

    tracing::debug!(
        difficulty = %recommendation.level,
        batch_size,
        misconceptions = misconceptions_to_address.len(),
        "directive built"
    );

    Ok(PersonalizationDirective {
        difficulty: recommendation.level,
        weak_traits: recommendation.weak_traits,
        strong_traits: recommendation.strong_traits,
        moderate_traits: analysis.moderate_names(),
        target_mix,
        misconceptions_to_address,
        rationale,
        trait_levels: recommendation.trait_levels,
        difficulty_distribution,
        confidence: recommendation.confidence,
    })
}
