//! Lexicon-driven intent classification using regex patterns.
//!
//! Each lexicon entry groups a set of patterns under one intent. The entry
//! with the highest confidence among those that match wins.

use crate::brain::router::IntentClassifier;
use crate::models::{ClassifierSource, IntentMatch};
use rand::seq::SliceRandom;
use regex::Regex;
use std::sync::LazyLock;

/// Extra confidence granted for every pattern matched beyond the first.
const EXTRA_MATCH_BONUS: f32 = 0.05;

/// One intent in the pattern lexicon.
#[derive(Debug, Clone)]
pub struct LexiconEntry {
    pub intent: String,
    pub patterns: Vec<Regex>,
    /// Confidence of a single matching pattern.
    pub weight: f32,
    pub responses: Vec<String>,
    /// Matching this entry hands the conversation to human support.
    pub escalate: bool,
}

impl LexiconEntry {
    /// Confidence for `text`, or `None` when no pattern matches.
    fn score(&self, text: &str) -> Option<(f32, Vec<String>)> {
        let matched: Vec<String> = self
            .patterns
            .iter()
            .filter_map(|p| p.find(text).map(|m| m.as_str().to_string()))
            .collect();

        if matched.is_empty() {
            return None;
        }

        let bonus = (matched.len() - 1) as f32 * EXTRA_MATCH_BONUS;
        Some(((self.weight + bonus).min(1.0), matched))
    }
}

// NOTE: expect() is acceptable here: the patterns are literals and a typo must fail loudly at startup.
static REQUEST_HUMAN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(talk|speak|chat)\s+(to|with)\s+(a\s+|an\s+)?(human|person|agent|representative|someone)\b")
            .expect("Invalid regex: talk-to-human pattern"),
        Regex::new(r"(?i)\b(human agent|real person|live agent|customer service representative)\b")
            .expect("Invalid regex: human agent nouns"),
        Regex::new(r"(?i)\b(transfer|connect)\s+me\b").expect("Invalid regex: transfer-me pattern"),
    ]
});

static GREETING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^(hello|hi|hey|greetings|good morning|good afternoon|good evening)\b")
            .expect("Invalid regex: English greetings"),
        Regex::new(r"(?i)^(howdy|hiya|yo)\b").expect("Invalid regex: informal greetings"),
    ]
});

static FAREWELL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(goodbye|bye|farewell|see you|take care|good night)\b")
            .expect("Invalid regex: English farewells"),
        Regex::new(r"(?i)^(that's all|that is all|nothing else)\b").expect("Invalid regex: closing phrases"),
    ]
});

fn default_lexicon() -> Vec<LexiconEntry> {
    vec![
        LexiconEntry {
            intent: "request_human".to_string(),
            patterns: REQUEST_HUMAN_PATTERNS.clone(),
            weight: 0.95,
            responses: vec!["Connecting you to a human agent. Please wait a moment...".to_string()],
            escalate: true,
        },
        LexiconEntry {
            intent: "greeting".to_string(),
            patterns: GREETING_PATTERNS.clone(),
            weight: 0.9,
            responses: vec![
                "Hello! How can I help you today?".to_string(),
                "Hi there! What can I do for you?".to_string(),
            ],
            escalate: false,
        },
        LexiconEntry {
            intent: "farewell".to_string(),
            patterns: FAREWELL_PATTERNS.clone(),
            weight: 0.85,
            responses: vec![
                "Goodbye! Feel free to come back if you have more questions.".to_string(),
                "Thanks for chatting. Have a great day!".to_string(),
            ],
            escalate: false,
        },
    ]
}

/// Regex lexicon classifier.
pub struct PatternClassifier {
    entries: Vec<LexiconEntry>,
    threshold: f32,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new(0.6)
    }
}

impl PatternClassifier {
    /// Classifier over the built-in lexicon.
    pub fn new(threshold: f32) -> Self {
        Self::with_entries(default_lexicon(), threshold)
    }

    pub fn with_entries(entries: Vec<LexiconEntry>, threshold: f32) -> Self {
        Self { entries, threshold }
    }
}

impl IntentClassifier for PatternClassifier {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn source(&self) -> ClassifierSource {
        ClassifierSource::Pattern
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn classify(&self, text: &str) -> Option<IntentMatch> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut best: Option<(&LexiconEntry, f32, Vec<String>)> = None;
        for entry in &self.entries {
            if let Some((score, matched)) = entry.score(text) {
                // Strictly greater: earlier entries win ties.
                if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                    best = Some((entry, score, matched));
                }
            }
        }

        let (entry, score, matched) = best?;
        let mut result = IntentMatch::new(entry.intent.clone(), score, ClassifierSource::Pattern)
            .with_slot("matched_pattern", matched.join(" | "));
        if let Some(reply) = entry.responses.choose(&mut rand::thread_rng()) {
            result = result.with_reply(reply.clone());
        }
        if entry.escalate {
            result = result.escalating();
        }
        Some(result)
    }
}
