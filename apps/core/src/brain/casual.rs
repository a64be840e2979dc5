//! Chit-chat detection.
//!
//! Compares the normalized utterance against a lexicon of casual phrases using
//! token-set overlap (Dice coefficient). A confident hit answers from the
//! category's preset replies and bypasses semantic search.

use crate::brain::normalize;
use crate::brain::router::IntentClassifier;
use crate::models::{ClassifierSource, IntentMatch, INTENT_CASUAL};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Casual phrases and replies grouped by category.
///
/// Same shape as the `chat_patterns.json` data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasualLexicon {
    pub casual_patterns: BTreeMap<String, Vec<String>>,
    pub casual_responses: BTreeMap<String, Vec<String>>,
}

impl Default for CasualLexicon {
    fn default() -> Self {
        let mut casual_patterns = BTreeMap::new();
        let mut casual_responses = BTreeMap::new();

        let mut add = |category: &str, patterns: &[&str], responses: &[&str]| {
            casual_patterns.insert(
                category.to_string(),
                patterns.iter().map(|s| s.to_string()).collect(),
            );
            casual_responses.insert(
                category.to_string(),
                responses.iter().map(|s| s.to_string()).collect(),
            );
        };

        add(
            "greeting",
            &["hello", "hi", "hey there", "good morning", "good afternoon", "good evening"],
            &["Hello! How can I help you today?", "Hi! What can I do for you?"],
        );
        add(
            "how_are_you",
            &["how are you", "how are you doing", "how is it going", "hows your day"],
            &["I'm doing well, thanks for asking! How can I help you?"],
        );
        add(
            "thanks",
            &["thanks", "thank you", "thank you very much", "thanks a lot", "much appreciated"],
            &["You're welcome!", "Happy to help!", "Anytime! Anything else I can do?"],
        );
        add(
            "identity",
            &["who are you", "what are you", "are you a bot", "are you a robot", "what is your name"],
            &["I'm a virtual assistant here to answer your questions."],
        );
        add(
            "goodbye",
            &["bye", "goodbye", "see you later", "thats all", "have a nice day"],
            &["Goodbye! Have a great day!", "See you next time!"],
        );

        Self {
            casual_patterns,
            casual_responses,
        }
    }
}

struct CasualPattern {
    category: String,
    text: String,
    tokens: HashSet<String>,
}

/// Token-overlap chit-chat classifier.
pub struct CasualChatDetector {
    patterns: Vec<CasualPattern>,
    responses: BTreeMap<String, Vec<String>>,
    threshold: f32,
}

impl CasualChatDetector {
    pub fn new(threshold: f32) -> Self {
        Self::with_lexicon(CasualLexicon::default(), threshold)
    }

    pub fn with_lexicon(lexicon: CasualLexicon, threshold: f32) -> Self {
        let patterns = lexicon
            .casual_patterns
            .iter()
            .flat_map(|(category, phrases)| {
                phrases.iter().map(move |phrase| {
                    let text = normalize(phrase);
                    CasualPattern {
                        category: category.clone(),
                        tokens: tokens(&text),
                        text,
                    }
                })
            })
            .filter(|p| !p.tokens.is_empty())
            .collect();

        Self {
            patterns,
            responses: lexicon.casual_responses,
            threshold,
        }
    }
}

fn tokens(normalized: &str) -> HashSet<String> {
    normalized.split_whitespace().map(str::to_string).collect()
}

/// Dice coefficient over token sets: `2|A∩B| / (|A| + |B|)`.
fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f32;
    2.0 * shared / (a.len() + b.len()) as f32
}

impl IntentClassifier for CasualChatDetector {
    fn name(&self) -> &'static str {
        "casual"
    }

    fn source(&self) -> ClassifierSource {
        ClassifierSource::Casual
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn classify(&self, text: &str) -> Option<IntentMatch> {
        let normalized = normalize(text);
        let query = tokens(&normalized);
        if query.is_empty() {
            return None;
        }

        let mut best: Option<(&CasualPattern, f32)> = None;
        for pattern in &self.patterns {
            let score = if pattern.text == normalized {
                1.0
            } else {
                dice(&query, &pattern.tokens)
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((pattern, score));
            }
        }

        let (pattern, score) = best.filter(|(_, s)| *s > 0.0)?;
        let mut result = IntentMatch::new(INTENT_CASUAL, score, ClassifierSource::Casual)
            .with_slot("category", pattern.category.clone())
            .with_slot("matched_pattern", pattern.text.clone());

        let reply = self
            .responses
            .get(&pattern.category)
            .and_then(|replies| replies.choose(&mut rand::thread_rng()))
            .cloned()
            .unwrap_or_else(|| "Hello!".to_string());
        result = result.with_reply(reply);
        Some(result)
    }
}
