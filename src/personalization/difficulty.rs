//! Difficulty Calibrator
//!
//! Maps a trait profile to one recommended difficulty level. The core decision is
//! count based (weak vs strong traits) so it never depends on map iteration order;
//! the average only breaks ties. Effectiveness history can nudge the result one
//! step in either direction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::personalization::config::{
    BucketThresholds, HistoryConfig, PersonalizationConfig, TraitLevelThresholds,
};
use crate::personalization::types::{DifficultyLevel, TraitProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationRule {
    EmptyProfile,
    WeakMajority,
    StrongMajority,
    LowAverage,
    HighAverage,
    Balanced,
}

impl CalibrationRule {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::EmptyProfile => "no traits assessed yet",
            Self::WeakMajority => "more weak than strong traits, reinforcing foundations",
            Self::StrongMajority => "more strong than weak traits, raising the challenge",
            Self::LowAverage => "balanced buckets with a low average",
            Self::HighAverage => "balanced buckets with a high average",
            Self::Balanced => "balanced profile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub weak: usize,
    pub moderate: usize,
    pub strong: usize,
    pub average: Option<f64>,
}

impl BucketCounts {
    pub fn of(profile: &TraitProfile, buckets: &BucketThresholds) -> Self {
        let mut counts = Self {
            weak: 0,
            moderate: 0,
            strong: 0,
            average: profile.mean(),
        };
        for (_, score) in profile.iter() {
            if score < buckets.weak_below {
                counts.weak += 1;
            } else if score < buckets.strong_from {
                counts.moderate += 1;
            } else {
                counts.strong += 1;
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub level: DifficultyLevel,
    pub rule: CalibrationRule,
    pub counts: BucketCounts,
}

/// Recommended difficulty for the next batch.
pub fn calibrate(profile: &TraitProfile, config: &PersonalizationConfig) -> DifficultyLevel {
    explain(profile, config).level
}

/// [`calibrate`] together with the rule that decided it.
pub fn explain(profile: &TraitProfile, config: &PersonalizationConfig) -> Calibration {
    let profile = profile.sanitized(config.baseline_score);
    let buckets = &config.buckets;
    let counts = BucketCounts::of(&profile, buckets);

    let (level, rule) = match counts.average {
        None => (DifficultyLevel::Medium, CalibrationRule::EmptyProfile),
        Some(_) if counts.weak > counts.strong => {
            (DifficultyLevel::Medium, CalibrationRule::WeakMajority)
        }
        Some(_) if counts.strong > counts.weak => {
            (DifficultyLevel::Hard, CalibrationRule::StrongMajority)
        }
        Some(avg) if avg < buckets.weak_below => (DifficultyLevel::Easy, CalibrationRule::LowAverage),
        Some(avg) if avg > buckets.strong_from => {
            (DifficultyLevel::Expert, CalibrationRule::HighAverage)
        }
        Some(_) => (DifficultyLevel::Medium, CalibrationRule::Balanced),
    };

    Calibration {
        level,
        rule,
        counts,
    }
}

pub fn trait_level(score: f64, thresholds: &TraitLevelThresholds) -> DifficultyLevel {
    if score < thresholds.medium_from {
        DifficultyLevel::Easy
    } else if score < thresholds.hard_from {
        DifficultyLevel::Medium
    } else if score < thresholds.expert_from {
        DifficultyLevel::Hard
    } else {
        DifficultyLevel::Expert
    }
}

pub fn trait_levels(
    profile: &TraitProfile,
    config: &PersonalizationConfig,
) -> BTreeMap<String, DifficultyLevel> {
    profile
        .sanitized(config.baseline_score)
        .iter()
        .map(|(name, score)| (name.to_string(), trait_level(score, &config.trait_levels)))
        .collect()
}

/// High score spread means less trust in a single profile-wide level.
pub fn recommendation_confidence(profile: &TraitProfile) -> f64 {
    match profile.variance() {
        Some(variance) => (1.0 - variance * 2.0).max(0.5),
        None => 0.5,
    }
}

/// Number of questions per level for a batch of `total`.
pub fn difficulty_distribution(
    level: DifficultyLevel,
    weak_count: usize,
    total: usize,
) -> BTreeMap<DifficultyLevel, usize> {
    let share = |percent: usize| total * percent / 100;
    let mut counts: BTreeMap<DifficultyLevel, usize> =
        DifficultyLevel::ALL.iter().map(|l| (*l, 0)).collect();

    let shares: &[(DifficultyLevel, usize)] = match level {
        DifficultyLevel::Easy => &[(DifficultyLevel::Easy, 70), (DifficultyLevel::Medium, 30)],
        DifficultyLevel::Medium => &[
            (DifficultyLevel::Easy, 20),
            (DifficultyLevel::Medium, 60),
            (DifficultyLevel::Hard, 20),
        ],
        DifficultyLevel::Hard => &[
            (DifficultyLevel::Medium, 30),
            (DifficultyLevel::Hard, 60),
            (DifficultyLevel::Expert, 10),
        ],
        DifficultyLevel::Expert => &[(DifficultyLevel::Hard, 40), (DifficultyLevel::Expert, 60)],
    };
    for (bucket, percent) in shares {
        counts.insert(*bucket, share(*percent));
    }

    if weak_count > 0 {
        let hard = counts[&DifficultyLevel::Hard];
        let shift = weak_count.min(3).min(hard);
        *counts.entry(DifficultyLevel::Hard).or_default() -= shift;
        *counts.entry(DifficultyLevel::Medium).or_default() += shift;
    }

    let allocated: usize = counts.values().sum();
    if allocated < total {
        *counts.entry(level).or_default() += total - allocated;
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effectiveness {
    Improved,
    Maintained,
    Declined,
}

/// How one trait moved after a batch at a given difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivenessRecord {
    pub trait_name: String,
    pub difficulty_used: DifficultyLevel,
    pub score_before: f64,
    pub score_after: f64,
    pub score_change: f64,
    pub questions_count: usize,
    pub effectiveness: Effectiveness,
    pub sequence: u64,
}

impl EffectivenessRecord {
    pub fn observe(
        trait_name: impl Into<String>,
        difficulty_used: DifficultyLevel,
        score_before: f64,
        score_after: f64,
        questions_count: usize,
        sequence: u64,
        config: &HistoryConfig,
    ) -> Self {
        let score_change = score_after - score_before;
        let effectiveness = if score_change > config.change_epsilon {
            Effectiveness::Improved
        } else if score_change < -config.change_epsilon {
            Effectiveness::Declined
        } else {
            Effectiveness::Maintained
        };

        Self {
            trait_name: trait_name.into(),
            difficulty_used,
            score_before,
            score_after,
            score_change,
            questions_count,
            effectiveness,
            sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryAdjustment {
    pub from: DifficultyLevel,
    pub to: DifficultyLevel,
    pub reason: String,
}

/// Steps `level` by one when recent batches mostly declined or mostly improved.
pub fn adjust_for_history(
    level: DifficultyLevel,
    history: &[EffectivenessRecord],
    profile: &TraitProfile,
    config: &HistoryConfig,
) -> Option<HistoryAdjustment> {
    let mut by_trait: BTreeMap<&str, Vec<&EffectivenessRecord>> = BTreeMap::new();
    for entry in history {
        by_trait.entry(entry.trait_name.as_str()).or_default().push(entry);
    }

    let (mut improvements, mut declines) = (0usize, 0usize);
    for entries in by_trait.values_mut() {
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        for entry in entries.iter().take(config.window) {
            match entry.effectiveness {
                Effectiveness::Improved => improvements += 1,
                Effectiveness::Declined => declines += 1,
                Effectiveness::Maintained => {}
            }
        }
    }

    if declines > improvements * 2 && level != DifficultyLevel::Easy {
        return Some(HistoryAdjustment {
            from: level,
            to: level.easier(),
            reason: "recent performance declined, reducing difficulty".to_string(),
        });
    }

    let all_strong = profile.iter().all(|(_, score)| score > config.strong_floor);
    if improvements > declines * 2 && all_strong && level != DifficultyLevel::Expert {
        return Some(HistoryAdjustment {
            from: level,
            to: level.harder(),
            reason: "consistent improvement, increasing challenge".to_string(),
        });
    }

    None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRecommendation {
    pub level: DifficultyLevel,
    pub base_level: DifficultyLevel,
    pub rule: CalibrationRule,
    pub counts: BucketCounts,
    pub trait_levels: BTreeMap<String, DifficultyLevel>,
    pub confidence: f64,
    pub weak_traits: Vec<String>,
    pub strong_traits: Vec<String>,
    pub adjustment: Option<HistoryAdjustment>,
    pub reasoning: String,
}

pub fn recommend(
    profile: &TraitProfile,
    history: &[EffectivenessRecord],
    config: &PersonalizationConfig,
) -> DifficultyRecommendation {
    let profile = profile.sanitized(config.baseline_score);
    let calibration = explain(&profile, config);
    let adjustment = adjust_for_history(calibration.level, history, &profile, &config.history);
    let level = adjustment.as_ref().map_or(calibration.level, |a| a.to);

    let weak_traits: Vec<String> = profile
        .ranked_ascending()
        .into_iter()
        .filter(|(_, score)| *score < config.buckets.weak_below)
        .map(|(name, _)| name.to_string())
        .collect();
    let strong_traits: Vec<String> = profile
        .ranked_descending()
        .into_iter()
        .filter(|(_, score)| *score >= config.buckets.strong_from)
        .map(|(name, _)| name.to_string())
        .collect();

    let mut reasoning = format!(
        "{} ({} weak, {} strong)",
        calibration.rule.describe(),
        calibration.counts.weak,
        calibration.counts.strong
    );
    if let Some(adj) = &adjustment {
        reasoning.push_str(&format!("; adjusted {} -> {}: {}", adj.from, adj.to, adj.reason));
    }

    tracing::debug!(
        level = %level,
        rule = ?calibration.rule,
        weak = calibration.counts.weak,
        strong = calibration.counts.strong,
        "difficulty calibrated"
    );

    DifficultyRecommendation {
        level,
        base_level: calibration.level,
        rule: calibration.rule,
        counts: calibration.counts,
        trait_levels: trait_levels(&profile, config),
        confidence: recommendation_confidence(&profile),
        weak_traits,
        strong_traits,
        adjustment,
        reasoning,
    }
}
