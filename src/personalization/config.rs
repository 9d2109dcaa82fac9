use serde::{Deserialize, Serialize};

use crate::personalization::error::{PersonalizationError, Result};
use crate::personalization::sanitize::is_unit_interval;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BktParams {
    pub p_slip: f64,
    pub p_guess: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_slip: 0.1,
            p_guess: 0.2,
        }
    }
}

/// Contribution of each signal to the blended trait score. Must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub bayesian: f64,
    pub reasoning: f64,
    pub calibration: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            bayesian: 0.6,
            reasoning: 0.25,
            calibration: 0.15,
        }
    }
}

impl BlendWeights {
    pub fn sum(&self) -> f64 {
        self.bayesian + self.reasoning + self.calibration
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketThresholds {
    pub weak_below: f64,
    pub strong_from: f64,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            weak_below: 0.60,
            strong_from: 0.80,
        }
    }
}

/// Per-trait level cut points used for trait-specific difficulty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitLevelThresholds {
    pub medium_from: f64,
    pub hard_from: f64,
    pub expert_from: f64,
}

impl Default for TraitLevelThresholds {
    fn default() -> Self {
        Self {
            medium_from: 0.55,
            hard_from: 0.70,
            expert_from: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    pub ratio: f64,
    pub default_batch_size: usize,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            ratio: 0.6,
            default_batch_size: 10,
        }
    }
}

/// What happens to a resolved misconception when the learner gets it wrong again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReopenPolicy {
    #[default]
    Reopen,
    StayResolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MisconceptionPolicy {
    pub resolution_streak: u32,
    pub reopen: ReopenPolicy,
    pub max_addressed: Option<usize>,
}

impl ReopenPolicy {
    pub fn from_flag(reopen: bool) -> Self {
        if reopen {
            Self::Reopen
        } else {
            Self::StayResolved
        }
    }
}

/// Reads a boolean switch from the environment: `true/false`, `1/0`, `yes/no`
/// or `on/off`, ignoring case and surrounding whitespace.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for MisconceptionPolicy {
    fn default() -> Self {
        Self {
            resolution_streak: 3,
            reopen: ReopenPolicy::Reopen,
            max_addressed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub window: usize,
    pub change_epsilon: f64,
    pub strong_floor: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: 3,
            change_epsilon: 0.02,
            strong_floor: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dedupe_window: usize,
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedupe_window: 256,
            history_capacity: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalizationConfig {
    pub bkt: BktParams,
    pub blend: BlendWeights,
    pub baseline_score: f64,
    pub buckets: BucketThresholds,
    pub trait_levels: TraitLevelThresholds,
    pub targeting: TargetingConfig,
    pub misconception: MisconceptionPolicy,
    pub history: HistoryConfig,
    pub engine: EngineConfig,
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            bkt: BktParams::default(),
            blend: BlendWeights::default(),
            baseline_score: 0.5,
            buckets: BucketThresholds::default(),
            trait_levels: TraitLevelThresholds::default(),
            targeting: TargetingConfig::default(),
            misconception: MisconceptionPolicy::default(),
            history: HistoryConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl PersonalizationConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PERSONALIZATION_P_SLIP") {
            config.bkt.p_slip = val.parse().unwrap_or(config.bkt.p_slip);
        }
        if let Ok(val) = std::env::var("PERSONALIZATION_P_GUESS") {
            config.bkt.p_guess = val.parse().unwrap_or(config.bkt.p_guess);
        }
        if let Ok(val) = std::env::var("PERSONALIZATION_TARGET_RATIO") {
            config.targeting.ratio = val.parse().unwrap_or(config.targeting.ratio);
        }
        if let Ok(val) = std::env::var("PERSONALIZATION_RESOLUTION_STREAK") {
            config.misconception.resolution_streak =
                val.parse().unwrap_or(config.misconception.resolution_streak);
        }
        if let Ok(val) = std::env::var("PERSONALIZATION_REOPEN_RESOLVED") {
            match parse_flag(&val) {
                Some(reopen) => config.misconception.reopen = ReopenPolicy::from_flag(reopen),
                None => tracing::warn!(value = %val, "ignoring unrecognized PERSONALIZATION_REOPEN_RESOLVED"),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("bkt.p_slip", self.bkt.p_slip)?;
        check_unit("bkt.p_guess", self.bkt.p_guess)?;
        check_unit("blend.bayesian", self.blend.bayesian)?;
        check_unit("blend.reasoning", self.blend.reasoning)?;
        check_unit("blend.calibration", self.blend.calibration)?;
        if (self.blend.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PersonalizationError::InvalidConfig(format!(
                "blend weights must sum to 1, got {}",
                self.blend.sum()
            )));
        }
        check_unit("baseline_score", self.baseline_score)?;
        check_unit("buckets.weak_below", self.buckets.weak_below)?;
        check_unit("buckets.strong_from", self.buckets.strong_from)?;
        if self.buckets.weak_below > self.buckets.strong_from {
            return Err(PersonalizationError::InvalidConfig(
                "buckets.weak_below must not exceed buckets.strong_from".to_string(),
            ));
        }
        let levels = &self.trait_levels;
        if !(levels.medium_from <= levels.hard_from && levels.hard_from <= levels.expert_from) {
            return Err(PersonalizationError::InvalidConfig(
                "trait level thresholds must be non-decreasing".to_string(),
            ));
        }
        check_unit("targeting.ratio", self.targeting.ratio)?;
        if self.targeting.default_batch_size == 0 {
            return Err(PersonalizationError::InvalidConfig(
                "targeting.default_batch_size must be positive".to_string(),
            ));
        }
        if self.misconception.resolution_streak == 0 {
            return Err(PersonalizationError::InvalidConfig(
                "misconception.resolution_streak must be positive".to_string(),
            ));
        }
        if self.history.window == 0 {
            return Err(PersonalizationError::InvalidConfig(
                "history.window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if is_unit_interval(value) {
        Ok(())
    } else {
        Err(PersonalizationError::InvalidConfig(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_numeric_and_word_forms() {
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn zero_flag_keeps_resolved_misconceptions_closed() {
        let policy = parse_flag("0").map(ReopenPolicy::from_flag);
        assert_eq!(policy, Some(ReopenPolicy::StayResolved));
        assert_eq!(parse_flag("no").map(ReopenPolicy::from_flag), Some(ReopenPolicy::StayResolved));
        assert_eq!(parse_flag("1").map(ReopenPolicy::from_flag), Some(ReopenPolicy::Reopen));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PersonalizationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_blend_weights_not_summing_to_one() {
        let mut config = PersonalizationConfig::default();
        config.blend.calibration = 0.3;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PersonalizationError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_buckets() {
        let mut config = PersonalizationConfig::default();
        config.buckets.weak_below = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_resolution_streak() {
        let mut config = PersonalizationConfig::default();
        config.misconception.resolution_streak = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PersonalizationConfig =
            serde_json::from_str(r#"{"bkt": {"p_slip": 0.05}, "targeting": {"ratio": 0.5}}"#)
                .unwrap();
        assert_eq!(config.bkt.p_slip, 0.05);
        assert_eq!(config.bkt.p_guess, 0.2);
        assert_eq!(config.targeting.ratio, 0.5);
        assert_eq!(config.targeting.default_batch_size, 10);
        assert_eq!(config.misconception.reopen, ReopenPolicy::Reopen);
    }
}
