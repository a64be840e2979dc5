//! Emotion and urgency scoring.
//!
//! Both scorers are pure keyword classifiers over the raw utterance. Single
//! words match whole tokens; multi-word keywords match as contiguous phrases.
//! Their labels annotate the turn and never influence response selection.

use crate::brain::normalize;
use crate::models::{Emotion, Urgency};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Keyword sets for the emotion scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionKeywords {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Keyword sets for the urgency scorer, ranked high > medium > low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyKeywords {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

/// Both keyword tables, in the `emotion_urgency_rules.json` layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRules {
    #[serde(rename = "emotion_rules")]
    pub emotion: EmotionKeywords,
    #[serde(rename = "urgency_rules")]
    pub urgency: UrgencyKeywords,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self {
            emotion: EmotionKeywords {
                positive: owned(&[
                    "thanks", "thank you", "great", "excellent", "awesome", "amazing", "love",
                    "happy", "perfect", "helpful", "wonderful", "appreciate", "glad", "fantastic",
                ]),
                negative: owned(&[
                    "terrible", "awful", "horrible", "bad", "worst", "hate", "angry", "frustrated",
                    "frustrating", "disappointed", "annoyed", "upset", "useless", "broken",
                    "not working", "ridiculous", "unacceptable",
                ]),
            },
            urgency: UrgencyKeywords {
                high: owned(&[
                    "immediately", "urgent", "urgently", "asap", "emergency", "right now",
                    "right away", "critical", "as soon as possible",
                ]),
                medium: owned(&["soon", "today", "quickly", "waiting", "still", "when will", "how long"]),
                low: owned(&["whenever", "no rush", "just wondering", "curious", "sometime", "eventually"]),
            },
        }
    }
}

/// A compiled keyword tier: single words and multi-word phrases, normalized.
#[derive(Debug, Clone, Default)]
struct KeywordSet {
    words: HashSet<String>,
    phrases: Vec<String>,
}

impl KeywordSet {
    fn compile(keywords: &[String]) -> Self {
        let mut set = Self::default();
        for keyword in keywords {
            let normalized = normalize(keyword);
            if normalized.is_empty() {
                continue;
            }
            if normalized.contains(' ') {
                set.phrases.push(normalized);
            } else {
                set.words.insert(normalized);
            }
        }
        set
    }

    fn matches(&self, text: &ScoredText) -> bool {
        text.tokens.iter().any(|t| self.words.contains(t))
            || self.phrases.iter().any(|p| text.padded.contains(&format!(" {} ", p)))
    }
}

/// Utterance prepared once for keyword lookups.
struct ScoredText {
    tokens: Vec<String>,
    padded: String,
}

impl ScoredText {
    fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        Self {
            tokens: normalized.split_whitespace().map(str::to_string).collect(),
            padded: format!(" {} ", normalized),
        }
    }
}

/// Positive / negative / neutral classifier. Negative wins over positive.
#[derive(Debug, Clone)]
pub struct EmotionScorer {
    positive: KeywordSet,
    negative: KeywordSet,
}

impl EmotionScorer {
    pub fn new(keywords: &EmotionKeywords) -> Self {
        Self {
            positive: KeywordSet::compile(&keywords.positive),
            negative: KeywordSet::compile(&keywords.negative),
        }
    }

    pub fn score(&self, text: &str) -> Emotion {
        self.score_prepared(&ScoredText::new(text))
    }

    fn score_prepared(&self, text: &ScoredText) -> Emotion {
        if self.negative.matches(text) {
            Emotion::Negative
        } else if self.positive.matches(text) {
            Emotion::Positive
        } else {
            Emotion::Neutral
        }
    }
}

/// High / medium / low classifier. First matching tier wins; low is the default.
#[derive(Debug, Clone)]
pub struct UrgencyScorer {
    high: KeywordSet,
    medium: KeywordSet,
    low: KeywordSet,
}

impl UrgencyScorer {
    pub fn new(keywords: &UrgencyKeywords) -> Self {
        Self {
            high: KeywordSet::compile(&keywords.high),
            medium: KeywordSet::compile(&keywords.medium),
            low: KeywordSet::compile(&keywords.low),
        }
    }

    pub fn score(&self, text: &str) -> Urgency {
        self.score_prepared(&ScoredText::new(text))
    }

    fn score_prepared(&self, text: &ScoredText) -> Urgency {
        [
            (Urgency::High, &self.high),
            (Urgency::Medium, &self.medium),
            (Urgency::Low, &self.low),
        ]
        .into_iter()
        .find(|(_, tier)| tier.matches(text))
        .map_or(Urgency::Low, |(level, _)| level)
    }
}

/// Runs both scorers over one utterance.
#[derive(Debug, Clone)]
pub struct EmotionUrgencyScorer {
    emotion: EmotionScorer,
    urgency: UrgencyScorer,
}

impl Default for EmotionUrgencyScorer {
    fn default() -> Self {
        Self::new(&KeywordRules::default())
    }
}

impl EmotionUrgencyScorer {
    pub fn new(rules: &KeywordRules) -> Self {
        Self {
            emotion: EmotionScorer::new(&rules.emotion),
            urgency: UrgencyScorer::new(&rules.urgency),
        }
    }

    pub fn score(&self, text: &str) -> (Emotion, Urgency) {
        let prepared = ScoredText::new(text);
        (
            self.emotion.score_prepared(&prepared),
            self.urgency.score_prepared(&prepared),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_sentiment_is_negative() {
        let scorer = EmotionUrgencyScorer::default();
        let (emotion, _) = scorer.score("Thanks, but the app is terrible");
        assert_eq!(emotion, Emotion::Negative);
    }

    #[test]
    fn test_high_beats_low_urgency() {
        let scorer = EmotionUrgencyScorer::default();
        let (_, urgency) = scorer.score("No rush really, but it's an emergency");
        assert_eq!(urgency, Urgency::High);
    }

    #[test]
    fn test_phrases_match_on_word_boundaries() {
        let scorer = EmotionUrgencyScorer::default();
        assert_eq!(scorer.score("My card is not working").0, Emotion::Negative);
        assert_eq!(scorer.score("Please fix it right now!").1, Urgency::High);
        // "bad" must not match inside "badge".
        assert_eq!(scorer.score("Where is my badge?").0, Emotion::Neutral);
    }

    #[test]
    fn test_defaults_when_nothing_matches() {
        let scorer = EmotionUrgencyScorer::default();
        assert_eq!(
            scorer.score("What payment methods do you accept?"),
            (Emotion::Neutral, Urgency::Low)
        );
        assert_eq!(scorer.score(""), (Emotion::Neutral, Urgency::Low));
    }

    #[test]
    fn test_medium_urgency() {
        let scorer = EmotionUrgencyScorer::default();
        assert_eq!(scorer.score("I'm still waiting for my order").1, Urgency::Medium);
    }

    #[test]
    fn test_custom_rules() {
        let rules = KeywordRules {
            emotion: EmotionKeywords {
                positive: vec!["stellar".to_string()],
                negative: vec![],
            },
            urgency: UrgencyKeywords {
                high: vec!["Right Now".to_string()],
                medium: vec![],
                low: vec![],
            },
        };
        let scorer = EmotionUrgencyScorer::new(&rules);
        assert_eq!(scorer.score("Stellar service, need it RIGHT NOW"), (Emotion::Positive, Urgency::High));
        assert_eq!(scorer.score("terrible"), (Emotion::Neutral, Urgency::Low));
    }
}
