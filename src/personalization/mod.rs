pub mod config;
pub mod difficulty;
pub mod directive;
pub mod engine;
pub mod error;
pub mod misconception;
pub mod requests;
pub mod sanitize;
pub mod targeting;
pub mod trait_update;
pub mod types;

pub use config::{PersonalizationConfig, ReopenPolicy};
pub use difficulty::{calibrate, recommend, DifficultyRecommendation, EffectivenessRecord};
pub use directive::{DirectiveInputs, PersonalizationDirective};
pub use engine::{LearnerSnapshot, PersonalizationEngine, SubmissionOutcome};
pub use error::{PersonalizationError, Result};
pub use misconception::{record, Transition};
pub use targeting::select;
pub use trait_update::update;
pub use types::*;
