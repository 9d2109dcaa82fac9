#![allow(dead_code)]

use std::collections::BTreeMap;

use adaptive_quiz::personalization::{
    PersonalizationConfig, PersonalizationEngine, QuizResponse, QuizSubmission, Topic,
    TraitProfile, TraitUpdateEvidence,
};

pub fn engine() -> PersonalizationEngine {
    PersonalizationEngine::new(PersonalizationConfig::default())
        .expect("default config is valid")
}

pub fn physics_profile() -> TraitProfile {
    TraitProfile::from_scores([
        ("precision", 0.72),
        ("confidence", 0.58),
        ("analytical_depth", 0.76),
        ("metacognition", 0.83),
    ])
}

pub fn physics_topics() -> Vec<Topic> {
    vec![
        Topic::new("vectors", "precision"),
        Topic::new("estimation", "confidence"),
        Topic::new("momentum", "analytical_depth"),
        Topic::new("lab-review", "metacognition"),
    ]
}

pub fn evidence(trait_name: &str, correct: bool) -> TraitUpdateEvidence {
    TraitUpdateEvidence {
        relevance: BTreeMap::from([(trait_name.to_string(), 1.0)]),
        correctness: correct,
        confidence: if correct { 0.8 } else { 0.4 },
        reasoning_quality: if correct { 0.7 } else { 0.3 },
    }
}

pub fn response(trait_name: &str, correct: bool) -> QuizResponse {
    QuizResponse::new(evidence(trait_name, correct))
}

pub fn tagged(trait_name: &str, correct: bool, misconception: &str) -> QuizResponse {
    response(trait_name, correct).with_misconception(misconception)
}

pub fn submission(id: &str, responses: Vec<QuizResponse>) -> QuizSubmission {
    QuizSubmission {
        submission_id: id.to_string(),
        responses,
    }
}
