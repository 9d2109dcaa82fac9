//! Misconception Tracker
//!
//! Per-id state machine fed by the same response stream as the trait engine:
//! unresolved while the correct streak is below the resolution threshold,
//! resolved once it reaches it. Whether a wrong answer re-opens a resolved
//! misconception is decided by [`ReopenPolicy`] alone.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::personalization::config::{MisconceptionPolicy, ReopenPolicy};
use crate::personalization::error::Result;
use crate::personalization::types::{
    MisconceptionObservation, MisconceptionRecord, MisconceptionRecords, Topic,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Untagged response, nothing to track.
    Ignored,
    Created,
    Progressed,
    Resolved,
    Reset,
    Reopened,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackOutcome {
    pub records: MisconceptionRecords,
    pub transition: Transition,
}

/// Applies one observation and returns the updated mapping.
pub fn record(
    records: &MisconceptionRecords,
    observation: &MisconceptionObservation,
    policy: &MisconceptionPolicy,
) -> Result<MisconceptionRecords> {
    Ok(track(records, observation, policy)?.records)
}

/// Same as [`record`], also reporting which transition fired.
///
/// A blank misconception id is rejected before anything is touched.
pub fn track(
    records: &MisconceptionRecords,
    observation: &MisconceptionObservation,
    policy: &MisconceptionPolicy,
) -> Result<TrackOutcome> {
    observation.validate()?;
    let mut next = keyed(records.clone());

    let Some(id) = observation.misconception_id.as_deref() else {
        return Ok(TrackOutcome {
            records: next,
            transition: Transition::Ignored,
        });
    };

    let transition = match next.get_mut(id) {
        Some(existing) => advance(existing, observation, policy),
        None => {
            next.insert(id.to_string(), first_occurrence(id, observation, policy));
            Transition::Created
        }
    };

    Ok(TrackOutcome {
        records: next,
        transition,
    })
}

/// Fills each record's `id` from its map key. Records decoded from the bare
/// `{occurrences, streak, resolved}` shape only carry their id as the key.
pub fn keyed(mut records: MisconceptionRecords) -> MisconceptionRecords {
    for (key, record) in records.iter_mut() {
        if record.id != *key {
            record.id = key.clone();
        }
        if record.description.is_empty() {
            record.description = key.clone();
        }
    }
    records
}

fn first_occurrence(
    id: &str,
    observation: &MisconceptionObservation,
    policy: &MisconceptionPolicy,
) -> MisconceptionRecord {
    let details = &observation.details;
    let mut record = MisconceptionRecord::new(id);
    if let Some(description) = &details.description {
        record.description = description.clone();
    }
    record.topic = details.topic.clone();
    record.severity = details.severity.unwrap_or_default();
    record.related_trait = details.related_trait.clone();
    record.occurrences = 1;
    record.streak = u32::from(observation.correctness);
    record.resolved = record.streak >= policy.resolution_streak;
    record.first_seen = observation.sequence;
    record.last_seen = observation.sequence;
    if record.resolved {
        record.resolved_at = observation.sequence;
    }
    record
}

fn advance(
    record: &mut MisconceptionRecord,
    observation: &MisconceptionObservation,
    policy: &MisconceptionPolicy,
) -> Transition {
    let threshold = policy.resolution_streak;
    let was_resolved = record.streak >= threshold;

    record.occurrences = record.occurrences.saturating_add(1);
    if observation.sequence.is_some() {
        record.last_seen = observation.sequence;
    }

    let transition = if observation.correctness {
        record.streak = record.streak.saturating_add(1);
        if !was_resolved && record.streak >= threshold {
            record.resolved_at = observation.sequence;
            Transition::Resolved
        } else {
            Transition::Progressed
        }
    } else if was_resolved {
        match policy.reopen {
            ReopenPolicy::Reopen => {
                record.streak = 0;
                record.resolved_at = None;
                Transition::Reopened
            }
            ReopenPolicy::StayResolved => Transition::Progressed,
        }
    } else {
        record.streak = 0;
        Transition::Reset
    };

    record.resolved = record.streak >= threshold;
    transition
}

/// Unresolved records worth addressing in the next batch, paired with their ids.
///
/// When `topics` is non-empty, only records tied to one of those topics (or to no
/// topic at all) qualify. Most severe first, then most frequent, then by id.
pub fn unresolved<'a>(
    records: &'a MisconceptionRecords,
    topics: &[Topic],
    policy: &MisconceptionPolicy,
) -> Vec<(&'a str, &'a MisconceptionRecord)> {
    let topic_ids: BTreeSet<&str> = topics.iter().map(|t| t.id.as_str()).collect();

    let mut open: Vec<(&str, &MisconceptionRecord)> = records
        .iter()
        .map(|(id, r)| (id.as_str(), r))
        .filter(|(_, r)| r.streak < policy.resolution_streak)
        .filter(|(_, r)| match (&r.topic, topic_ids.is_empty()) {
            (_, true) | (None, _) => true,
            (Some(topic), false) => topic_ids.contains(topic.as_str()),
        })
        .collect();

    open.sort_by(|(a_id, a), (b_id, b)| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.occurrences.cmp(&a.occurrences))
            .then_with(|| a_id.cmp(b_id))
    });

    if let Some(limit) = policy.max_addressed {
        open.truncate(limit);
    }
    open
}

/// Bumps the targeted-question counter on the listed records.
pub fn mark_targeted(records: &MisconceptionRecords, ids: &[String]) -> MisconceptionRecords {
    let mut next = records.clone();
    for id in ids {
        if let Some(record) = next.get_mut(id) {
            record.targeted_question_count = record.targeted_question_count.saturating_add(1);
        }
    }
    next
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MisconceptionProgress {
    pub topic: Option<String>,
    pub total: usize,
    pub resolved: usize,
    pub active: usize,
    pub resolution_rate: f64,
}

pub fn progress(
    records: &MisconceptionRecords,
    topic: Option<&str>,
    policy: &MisconceptionPolicy,
) -> MisconceptionProgress {
    let scoped: Vec<&MisconceptionRecord> = records
        .values()
        .filter(|r| topic.map_or(true, |t| r.topic.as_deref() == Some(t)))
        .collect();

    let total = scoped.len();
    let resolved = scoped
        .iter()
        .filter(|r| r.streak >= policy.resolution_streak)
        .count();
    let resolution_rate = if total == 0 {
        0.0
    } else {
        resolved as f64 / total as f64
    };

    MisconceptionProgress {
        topic: topic.map(str::to_string),
        total,
        resolved,
        active: total - resolved,
        resolution_rate,
    }
}
