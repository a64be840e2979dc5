//! # Brain Module
//!
//! Fast, side-effect free analysis of a user utterance.
//!
//! ## Components
//! - `router`: ordered classifier chain (`IntentClassifier` + `IntentRouter`)
//! - `intent`: lexicon-driven regex classifier (fast path)
//! - `casual`: chit-chat detector answering from a preset reply list
//! - `reserved`: extension slot for a statistical classifier
//! - `semantic`: FAQ similarity search client and threshold policy
//! - `emotion`: emotion and urgency keyword scorers

pub mod casual;
pub mod emotion;
pub mod intent;
pub mod reserved;
pub mod router;
pub mod semantic;

pub use casual::{CasualChatDetector, CasualLexicon};
pub use emotion::{EmotionScorer, EmotionUrgencyScorer, KeywordRules, UrgencyScorer};
pub use intent::{LexiconEntry, PatternClassifier};
pub use reserved::ReservedModelClassifier;
pub use router::{IntentClassifier, IntentRouter, RouteDecision};
pub use semantic::{cosine_similarity, SearchOutcome, SemanticSearchClient};

/// Lowercases, drops punctuation (apostrophes vanish, other symbols become
/// spaces) and collapses whitespace.
///
/// `"  What's your price? "` becomes `"whats your price"`.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '’')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
