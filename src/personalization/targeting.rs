//! Weakness Targeting Selector
//!
//! Splits a question batch into weakness-focused slots (topics tied to the
//! lowest-scoring traits) and round-robin coverage of everything else.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::personalization::config::PersonalizationConfig;
use crate::personalization::error::{PersonalizationError, Result};
use crate::personalization::sanitize::is_unit_interval;
use crate::personalization::types::{TargetMix, TargetSlot, Topic, TraitProfile};

/// Number of weakness-focused slots for a batch.
pub fn weak_slot_count(batch_size: usize, ratio: f64) -> usize {
    ((batch_size as f64 * ratio).round() as usize).min(batch_size)
}

fn validate(topics: &[Topic], batch_size: usize, ratio: f64) -> Result<()> {
    if batch_size == 0 {
        return Err(PersonalizationError::invalid_input("batch_size must be positive"));
    }
    if !is_unit_interval(ratio) {
        return Err(PersonalizationError::invalid_input(format!(
            "ratio must be within [0, 1], got {ratio}"
        )));
    }
    if topics.is_empty() {
        return Err(PersonalizationError::invalid_input(
            "at least one topic is required to build a target mix",
        ));
    }
    if let Some(topic) = topics
        .iter()
        .find(|t| t.id.trim().is_empty() || t.associated_trait.trim().is_empty())
    {
        return Err(PersonalizationError::invalid_input(format!(
            "topic '{}' needs both an id and an associated trait",
            topic.id
        )));
    }
    Ok(())
}

/// Builds the emphasis mix for the next batch.
///
/// Exactly `round(batch_size * ratio)` slots are weakness-focused. They go to
/// topics whose associated trait ranks lowest, cycling when there are fewer such
/// topics than slots. The rest are spread round-robin over the topics not used
/// for weakness slots, or over all topics when none are left.
pub fn select(
    profile: &TraitProfile,
    topics: &[Topic],
    batch_size: usize,
    ratio: f64,
    config: &PersonalizationConfig,
) -> Result<TargetMix> {
    validate(topics, batch_size, ratio)?;

    let mut ranking_profile = profile.sanitized(config.baseline_score);
    for topic in topics {
        if !ranking_profile.contains(&topic.associated_trait) {
            ranking_profile.set(topic.associated_trait.clone(), config.baseline_score);
        }
    }

    // Topic indices ordered by the weakness of their trait, caller order within a trait.
    let ranked: Vec<(usize, f64)> = ranking_profile
        .ranked_ascending()
        .into_iter()
        .flat_map(|(trait_name, score)| {
            topics
                .iter()
                .enumerate()
                .filter(move |(_, topic)| topic.associated_trait == trait_name)
                .map(move |(idx, _)| (idx, score))
        })
        .collect();

    let below_threshold: Vec<usize> = ranked
        .iter()
        .filter(|(_, score)| *score < config.buckets.weak_below)
        .map(|(idx, _)| *idx)
        .collect();
    let weak_pool: Vec<usize> = if below_threshold.is_empty() {
        ranked.iter().map(|(idx, _)| *idx).collect()
    } else {
        below_threshold
    };

    let n_weak = weak_slot_count(batch_size, ratio);
    let n_other = batch_size - n_weak;

    let mut slots = Vec::with_capacity(batch_size);
    let mut used: BTreeSet<usize> = BTreeSet::new();
    for idx in weak_pool.iter().cycle().take(n_weak) {
        used.insert(*idx);
        slots.push(slot(&topics[*idx], true));
    }

    let remaining: Vec<usize> = (0..topics.len()).filter(|idx| !used.contains(idx)).collect();
    let rotation: Vec<usize> = if remaining.is_empty() {
        (0..topics.len()).collect()
    } else {
        remaining
    };
    for idx in rotation.iter().cycle().take(n_other) {
        slots.push(slot(&topics[*idx], false));
    }

    tracing::debug!(
        batch_size,
        weak_slots = n_weak,
        other_slots = n_other,
        topics = topics.len(),
        "target mix selected"
    );

    Ok(TargetMix::from_slots(slots))
}

fn slot(topic: &Topic, is_weakness_focused: bool) -> TargetSlot {
    TargetSlot {
        topic: topic.id.clone(),
        targeted_trait: topic.associated_trait.clone(),
        is_weakness_focused,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaknessAnalysis {
    /// Weakest first.
    pub weak: Vec<(String, f64)>,
    /// Weakest first.
    pub moderate: Vec<(String, f64)>,
    /// Strongest first.
    pub strong: Vec<(String, f64)>,
}

impl WeaknessAnalysis {
    pub fn weak_names(&self) -> Vec<String> {
        self.weak.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn moderate_names(&self) -> Vec<String> {
        self.moderate.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn strong_names(&self) -> Vec<String> {
        self.strong.iter().map(|(name, _)| name.clone()).collect()
    }
}

pub fn analyze(profile: &TraitProfile, config: &PersonalizationConfig) -> WeaknessAnalysis {
    let profile = profile.sanitized(config.baseline_score);
    let buckets = &config.buckets;
    let owned = |(name, score): (&str, f64)| (name.to_string(), score);

    let ascending = profile.ranked_ascending();
    let weak = ascending
        .iter()
        .copied()
        .filter(|(_, s)| *s < buckets.weak_below)
        .map(owned)
        .collect();
    let moderate = ascending
        .iter()
        .copied()
        .filter(|(_, s)| *s >= buckets.weak_below && *s < buckets.strong_from)
        .map(owned)
        .collect();
    let strong = profile
        .ranked_descending()
        .into_iter()
        .filter(|(_, s)| *s >= buckets.strong_from)
        .map(owned)
        .collect();

    WeaknessAnalysis {
        weak,
        moderate,
        strong,
    }
}
