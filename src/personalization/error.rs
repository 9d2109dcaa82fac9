#[derive(Debug, thiserror::Error)]
pub enum PersonalizationError {
    #[error("invalid directive input: {0}")]
    InvalidDirectiveInput(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("unknown learner: {0}")]
    UnknownLearner(String),
    #[error("learner already enrolled: {0}")]
    AlreadyEnrolled(String),
    #[error("version conflict for learner {learner_id}: expected {expected}, found {actual}")]
    VersionConflict {
        learner_id: String,
        expected: u64,
        actual: u64,
    },
}

impl PersonalizationError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidDirectiveInput(msg.into())
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidDirectiveInput(_))
    }
}

impl From<serde_json::Error> for PersonalizationError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDirectiveInput(format!("malformed payload: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, PersonalizationError>;
