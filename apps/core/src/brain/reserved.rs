//! Slot for a statistical intent model.
//!
//! Registered last in the default chain so a future model can be dropped in
//! without touching the router. Until then it abstains on every input.

use crate::brain::router::IntentClassifier;
use crate::models::{ClassifierSource, IntentMatch};

pub struct ReservedModelClassifier {
    threshold: f32,
}

impl Default for ReservedModelClassifier {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

impl IntentClassifier for ReservedModelClassifier {
    fn name(&self) -> &'static str {
        "reserved"
    }

    fn source(&self) -> ClassifierSource {
        ClassifierSource::Reserved
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn classify(&self, _text: &str) -> Option<IntentMatch> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_abstains() {
        let classifier = ReservedModelClassifier::default();
        assert!(classifier.classify("I want a refund").is_none());
        assert_eq!(classifier.source(), ClassifierSource::Reserved);
    }
}
