use std::path::{Path, PathBuf};

use crate::personalization::config::parse_flag;
use crate::personalization::{PersonalizationConfig, PersonalizationError};

const DEFAULT_LOG_DIR: &str = "./logs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] PersonalizationError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Directory for the daily rolling log file. `None` keeps logs on stderr only.
    pub log_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the runtime config from any variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = var("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let file_logs = var("ENABLE_FILE_LOGS")
            .and_then(|value| parse_flag(&value))
            .unwrap_or(false);
        let log_dir = file_logs.then(|| {
            var("LOG_DIR")
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from)
        });
        let config_path = var("PERSONALIZATION_CONFIG")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Self {
            log_level,
            log_dir,
            config_path,
        }
    }

    /// Reads the JSON config file when one is set, otherwise the environment overrides.
    pub fn load_personalization(&self) -> Result<PersonalizationConfig, ConfigError> {
        let config = match &self.config_path {
            Some(path) => load_file(path)?,
            None => PersonalizationConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn load_file(path: &Path) -> Result<PersonalizationConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_for(path: &Path) -> Config {
        Config {
            log_level: "info".to_string(),
            log_dir: None,
            config_path: Some(path.to_path_buf()),
        }
    }

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn file_logs_are_off_by_default() {
        let config = Config::from_vars(vars(&[("LOG_DIR", "/var/log/quiz")]));
        assert_eq!(config.log_level, "info");
        assert!(config.log_dir.is_none());
        assert!(config.config_path.is_none());
    }

    #[test]
    fn numeric_and_word_flags_enable_file_logs() {
        for flag in ["1", "true", "YES", "on"] {
            let config = Config::from_vars(vars(&[("ENABLE_FILE_LOGS", flag)]));
            assert_eq!(config.log_dir, Some(PathBuf::from("./logs")), "flag {flag}");
        }
        for flag in ["0", "no", "garbage"] {
            let config = Config::from_vars(vars(&[("ENABLE_FILE_LOGS", flag)]));
            assert!(config.log_dir.is_none(), "flag {flag}");
        }
    }

    #[test]
    fn log_dir_and_config_path_come_from_vars() {
        let config = Config::from_vars(vars(&[
            ("RUST_LOG", "adaptive_quiz=debug"),
            ("ENABLE_FILE_LOGS", "1"),
            ("LOG_DIR", "/tmp/quiz-logs"),
            ("PERSONALIZATION_CONFIG", "  "),
        ]));
        assert_eq!(config.log_level, "adaptive_quiz=debug");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/quiz-logs")));
        assert!(config.config_path.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"targeting": {{"ratio": 0.5}}, "misconception": {{"reopen": "stay_resolved"}}}}"#).unwrap();
        let config = config_for(file.path()).load_personalization().unwrap();
        assert_eq!(config.targeting.ratio, 0.5);
        assert_eq!(config.targeting.default_batch_size, 10);
        assert_eq!(config.bkt.p_slip, 0.1);
        assert_eq!(
            config.misconception.reopen,
            crate::personalization::ReopenPolicy::StayResolved
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"blend": {{"bayesian": 0.9, "reasoning": 0.25, "calibration": 0.15}}}}"#).unwrap();
        let err = config_for(file.path()).load_personalization().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(PersonalizationError::InvalidConfig(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = config_for(&dir.path().join("absent.json"))
            .load_personalization()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_is_a_json_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = config_for(file.path()).load_personalization().unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
