//! Ordered classifier chain.
//!
//! Classifiers are queried in registration order. The first one whose match
//! reaches its own threshold wins; if none does, the caller falls back to
//! semantic search.

use crate::brain::casual::CasualChatDetector;
use crate::brain::intent::PatternClassifier;
use crate::brain::reserved::ReservedModelClassifier;
use crate::config::PipelineConfig;
use crate::models::{ClassifierSource, IntentMatch};
use tracing::debug;

/// Capability shared by every intent classifier variant.
///
/// Implementations are pure: no I/O, no interior mutation visible to callers.
pub trait IntentClassifier: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn source(&self) -> ClassifierSource;

    /// Minimum confidence for this classifier's match to be accepted.
    fn threshold(&self) -> f32;

    /// Returns the best candidate for `text`, or `None` to abstain.
    fn classify(&self, text: &str) -> Option<IntentMatch>;
}

/// Outcome of routing one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Empty or whitespace-only input; no classifier ran.
    Welcome,
    /// A classifier matched at or above its threshold.
    Matched(IntentMatch),
    /// Nothing was confident enough. `best` is the strongest sub-threshold candidate.
    NoConfidentIntent { best: Option<IntentMatch> },
}

/// Explicit, ordered registry of classifiers.
#[derive(Default)]
pub struct IntentRouter {
    classifiers: Vec<Box<dyn IntentClassifier>>,
}

impl IntentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard chain: pattern lexicon, then chit-chat, then the reserved model slot.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let casual = match &config.casual_lexicon {
            Some(lexicon) => CasualChatDetector::with_lexicon(lexicon.clone(), config.chit_chat_threshold),
            None => CasualChatDetector::new(config.chit_chat_threshold),
        };

        Self::new()
            .register(PatternClassifier::new(config.pattern_threshold))
            .register(casual)
            .register(ReservedModelClassifier::default())
    }

    /// Appends a classifier at the lowest priority.
    pub fn register<C: IntentClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifiers.push(Box::new(classifier));
        self
    }

    pub fn classifier_names(&self) -> Vec<&'static str> {
        self.classifiers.iter().map(|c| c.name()).collect()
    }

    pub fn route(&self, text: &str) -> RouteDecision {
        if text.trim().is_empty() {
            return RouteDecision::Welcome;
        }

        let mut best: Option<IntentMatch> = None;

        for classifier in &self.classifiers {
            let Some(candidate) = classifier.classify(text) else {
                continue;
            };

            debug!(
                classifier = classifier.name(),
                intent = %candidate.intent,
                confidence = candidate.confidence,
                threshold = classifier.threshold(),
                "Classifier candidate"
            );

            if candidate.confidence >= classifier.threshold() {
                return RouteDecision::Matched(candidate);
            }

            let stronger = best
                .as_ref()
                .map_or(true, |b| candidate.confidence > b.confidence);
            if stronger {
                best = Some(candidate);
            }
        }

        RouteDecision::NoConfidentIntent { best }
    }
}
