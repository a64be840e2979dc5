//! End-to-end pipeline tests against mock collaborators.

use super::mocks::{hit, test_config, MockEmbedder, MockIndex, MockTurnStore};
use crate::actors::messages::AppError;
use crate::config::PipelineConfig;
use crate::models::{Emotion, FeedbackKind, MetadataKey, Session, SessionStatus, Urgency};
use crate::pipeline::{DialogPipeline, ESCALATION_MESSAGE, INTENT_WELCOME, WELCOME_MESSAGE};
use std::sync::Arc;

const PAYMENT_ANSWER: &str = "We accept Visa, Mastercard, PayPal and bank transfer.";

struct Harness {
    pipeline: DialogPipeline,
    embedder: Arc<MockEmbedder>,
    index: Arc<MockIndex>,
    store: Arc<MockTurnStore>,
}

fn harness_with(config: PipelineConfig, index: MockIndex, store: MockTurnStore) -> Harness {
    let embedder = Arc::new(MockEmbedder::default());
    let index = Arc::new(index);
    let store = Arc::new(store);
    let pipeline = DialogPipeline::new(config, embedder.clone(), index.clone(), store.clone());
    Harness {
        pipeline,
        embedder,
        index,
        store,
    }
}

fn payment_harness(score: f32) -> Harness {
    harness_with(
        test_config(),
        MockIndex::with_hits(vec![hit(
            "faq-payment",
            score,
            "Which payment methods are accepted?",
            PAYMENT_ANSWER,
        )]),
        MockTurnStore::default(),
    )
}

#[tokio::test]
async fn test_empty_input_returns_welcome_without_side_effects() {
    let h = payment_harness(0.9);

    for text in ["", "   ", "\n\t"] {
        let response = h.pipeline.process(text, None).await.unwrap();
        assert_eq!(response.reply_text, WELCOME_MESSAGE);
        assert_eq!(response.intent, INTENT_WELCOME);
        assert_eq!(response.turn_number, None);
        assert_eq!(response.session_id, None);
        assert!(!response.need_human);
    }

    assert!(h.pipeline.sessions().is_empty());
    assert_eq!(h.store.turn_count(), 0);
    assert_eq!(h.index.calls(), 0);
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn test_empty_input_keeps_live_session_untouched() {
    let h = payment_harness(0.9);
    let first = h.pipeline.process("What payment methods do you accept?", None).await.unwrap();
    let id = first.session_id.unwrap();

    let welcome = h.pipeline.process("  ", Some(&id)).await.unwrap();
    assert_eq!(welcome.session_id.as_deref(), Some(id.as_str()));
    assert_eq!(h.pipeline.sessions().get(&id).await.unwrap().turn_count, 1);
    assert_eq!(h.store.turn_count(), 1);

    let unknown = h.pipeline.process("", Some("never-seen")).await.unwrap();
    assert_eq!(unknown.session_id, None);
}

#[tokio::test]
async fn test_payment_question_above_threshold_returns_faq_answer() {
    let h = payment_harness(0.82);

    let response = h
        .pipeline
        .process("What payment methods do you accept?", None)
        .await
        .unwrap();

    assert_eq!(response.intent, "faq_match");
    assert_eq!(response.reply_text, PAYMENT_ANSWER);
    assert!((response.confidence - 0.82).abs() < 1e-6);
    assert_eq!(response.emotion, Emotion::Neutral);
    assert_eq!(response.urgency, Urgency::Low);
    assert!(!response.need_human);
    assert_eq!(response.turn_number, Some(1));
    assert!(response.new_session);
    assert!(response.persisted);
    assert_eq!(response.slots.get("faq_id").map(String::as_str), Some("faq-payment"));
    assert_eq!(h.index.calls(), 1);

    let stored = h.store.turns_for(response.session_id.as_deref().unwrap());
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].intent, "faq_match");
    assert_eq!(stored[0].user_input, "What payment methods do you accept?");
}

#[tokio::test]
async fn test_score_at_threshold_counts_as_match() {
    let h = payment_harness(0.75);
    let response = h.pipeline.process("Do you take credit cards?", None).await.unwrap();
    assert_eq!(response.intent, "faq_match");
}

#[tokio::test]
async fn test_score_below_threshold_escalates_with_near_miss_confidence() {
    let h = payment_harness(0.61);
    let response = h.pipeline.process("Can I pay with seashells?", None).await.unwrap();

    assert_eq!(response.intent, "escalate");
    assert!(response.need_human);
    assert_eq!(response.reply_text, ESCALATION_MESSAGE);
    assert!((response.confidence - 0.61).abs() < 1e-6);
    assert_eq!(response.slots.get("reason").map(String::as_str), Some("no_confident_match"));
}

#[tokio::test]
async fn test_angry_cancellation_is_negative_and_urgent() {
    let h = payment_harness(0.4);
    let response = h
        .pipeline
        .process("This is terrible! I need to cancel immediately!", None)
        .await
        .unwrap();

    assert_eq!(response.emotion, Emotion::Negative);
    assert_eq!(response.urgency, Urgency::High);
    assert_eq!(response.intent, "escalate");

    let stored = h.store.turns_for(response.session_id.as_deref().unwrap());
    assert_eq!(stored[0].emotion, Emotion::Negative);
    assert_eq!(stored[0].urgency, Urgency::High);
}

#[tokio::test]
async fn test_pattern_match_never_calls_search() {
    let h = harness_with(test_config(), MockIndex::failing(), MockTurnStore::default());

    let greeting = h.pipeline.process("Hello there", None).await.unwrap();
    assert_eq!(greeting.intent, "greeting");
    assert!(!greeting.need_human);

    let human = h
        .pipeline
        .process("I want to speak to a human agent", greeting.session_id.as_deref())
        .await
        .unwrap();
    assert_eq!(human.intent, "request_human");
    assert!(human.need_human);
    assert_eq!(human.turn_number, Some(2));

    assert_eq!(h.index.calls(), 0);
    assert_eq!(h.embedder.calls(), 0);
}

#[tokio::test]
async fn test_casual_chat_bypasses_search() {
    let h = payment_harness(0.99);
    let response = h.pipeline.process("how are you doing", None).await.unwrap();
    assert_eq!(response.intent, "casual");
    assert_eq!(response.slots.get("category").map(String::as_str), Some("how_are_you"));
    assert_eq!(h.index.calls(), 0);
}

#[tokio::test]
async fn test_search_runs_once_per_unclassified_turn() {
    let h = payment_harness(0.82);
    let mut session = None;
    for (i, text) in ["What payment methods do you accept?", "Is there a refund policy?", "Where is my parcel?"]
        .into_iter()
        .enumerate()
    {
        let response = h.pipeline.process(text, session.as_deref()).await.unwrap();
        session = response.session_id;
        assert_eq!(h.index.calls(), i + 1);
    }
}

#[tokio::test]
async fn test_search_failure_degrades_to_escalation() {
    let h = harness_with(test_config(), MockIndex::failing(), MockTurnStore::default());
    let response = h.pipeline.process("Where is my order?", None).await.unwrap();

    assert_eq!(response.intent, "escalate");
    assert!(response.need_human);
    assert_eq!(response.confidence, 0.0);
    assert_eq!(response.slots.get("reason").map(String::as_str), Some("search_unavailable"));
    assert!(response.persisted);
}

#[tokio::test]
async fn test_search_timeout_degrades_to_escalation() {
    let index = MockIndex::with_hits(vec![hit("faq-late", 0.99, "q", "a")]).with_delay(1_000);
    let h = harness_with(test_config(), index, MockTurnStore::default());

    let response = h.pipeline.process("Where is my order?", None).await.unwrap();
    assert_eq!(response.intent, "escalate");
    assert_eq!(response.slots.get("reason").map(String::as_str), Some("search_unavailable"));
}

#[tokio::test]
async fn test_full_session_rolls_over_to_new_session() {
    let config = PipelineConfig {
        max_turns_per_session: 2,
        ..test_config()
    };
    let h = harness_with(
        config,
        MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]),
        MockTurnStore::default(),
    );

    let first = h.pipeline.process("question one", None).await.unwrap();
    let id = first.session_id.clone().unwrap();
    let second = h.pipeline.process("question two", Some(&id)).await.unwrap();
    assert_eq!(second.turn_number, Some(2));
    assert!(!second.new_session);

    let third = h.pipeline.process("question three", Some(&id)).await.unwrap();
    assert_ne!(third.session_id.as_deref(), Some(id.as_str()));
    assert!(third.new_session);
    assert_eq!(third.turn_number, Some(1));

    let old = h.pipeline.sessions().get(&id).await.unwrap();
    assert_eq!(old.status, SessionStatus::Closed);
    assert_eq!(old.turn_count, 2);
    assert_eq!(h.store.turns_for(&id).len(), 2);
}

#[tokio::test]
async fn test_persistence_failure_still_answers() {
    let h = harness_with(
        test_config(),
        MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", PAYMENT_ANSWER)]),
        MockTurnStore::broken(),
    );

    let response = h.pipeline.process("How can I pay?", None).await.unwrap();
    assert_eq!(response.reply_text, PAYMENT_ANSWER);
    assert!(!response.persisted);

    let id = response.session_id.unwrap();
    assert_eq!(h.pipeline.sessions().get(&id).await.unwrap().turn_count, 1);

    let next = h.pipeline.process("And by cheque?", Some(&id)).await.unwrap();
    assert_eq!(next.turn_number, Some(2));
}

#[tokio::test]
async fn test_transient_persistence_errors_are_retried() {
    let h = harness_with(
        test_config(),
        MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]),
        MockTurnStore::flaky(2),
    );

    let response = h.pipeline.process("How can I pay?", None).await.unwrap();
    assert!(response.persisted);
    assert_eq!(h.store.insert_calls(), 3);
    assert_eq!(h.store.turn_count(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let config = PipelineConfig {
        persistence_max_attempts: 2,
        ..test_config()
    };
    let h = harness_with(
        config,
        MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]),
        MockTurnStore::flaky(5),
    );

    let response = h.pipeline.process("How can I pay?", None).await.unwrap();
    assert!(!response.persisted);
    assert_eq!(h.store.insert_calls(), 2);
}

#[tokio::test]
async fn test_known_external_id_continues_persisted_numbering() {
    let store = MockTurnStore::default();
    store.preload("web-7", 4);
    let h = harness_with(
        test_config(),
        MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]),
        store,
    );

    let response = h.pipeline.process("Back again", Some("web-7")).await.unwrap();
    assert_eq!(response.session_id.as_deref(), Some("web-7"));
    assert_eq!(response.turn_number, Some(5));
    assert_eq!(h.store.turns_for("web-7").len(), 5);
}

#[tokio::test]
async fn test_end_session_then_new_turn_starts_fresh() {
    let h = payment_harness(0.9);
    let first = h.pipeline.process("How can I pay?", None).await.unwrap();
    let id = first.session_id.unwrap();

    let closed = h.pipeline.end_session(&id, "user_ended").await.unwrap();
    assert_eq!(closed.status, SessionStatus::Closed);
    assert_eq!(closed.metadata.get(MetadataKey::EndReason), Some("user_ended"));
    assert_eq!(
        h.store.sessions.lock().unwrap().get(&id).map(|s| s.status),
        Some(SessionStatus::Closed)
    );

    let next = h.pipeline.process("One more thing", Some(&id)).await.unwrap();
    assert_ne!(next.session_id.as_deref(), Some(id.as_str()));
    assert!(next.new_session);

    let err = h.pipeline.end_session("missing", "user_ended").await.unwrap_err();
    assert!(matches!(err, AppError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_ended_session_stays_ended_after_sweep() {
    let h = payment_harness(0.9);
    let first = h.pipeline.process("How can I pay?", Some("web-1")).await.unwrap();
    assert_eq!(first.session_id.as_deref(), Some("web-1"));
    assert_eq!(first.turn_number, Some(1));

    h.pipeline.end_session("web-1", "user_ended").await.unwrap();
    assert_eq!(h.pipeline.sessions().sweep_expired(), 1);

    let next = h.pipeline.process("How can I pay?", Some("web-1")).await.unwrap();
    assert_ne!(next.session_id.as_deref(), Some("web-1"));
    assert!(next.new_session);
    assert_eq!(next.turn_number, Some(1));
    assert_eq!(h.store.turns_for("web-1").len(), 1);
}

#[tokio::test]
async fn test_stored_closed_session_is_not_reopened() {
    let store = MockTurnStore::default();
    store.preload("web-3", 2);
    let mut previous = Session::new("web-3");
    previous.turn_count = 2;
    previous.status = SessionStatus::Closed;
    store.sessions.lock().unwrap().insert("web-3".to_string(), previous);
    let h = harness_with(test_config(), MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]), store);

    let response = h.pipeline.process("Hello again", Some("web-3")).await.unwrap();
    assert_ne!(response.session_id.as_deref(), Some("web-3"));
    assert_eq!(response.turn_number, Some(1));
    assert!(h.pipeline.sessions().is_retired("web-3"));
    assert_eq!(h.store.turns_for("web-3").len(), 2);
}

#[tokio::test]
async fn test_stored_idle_session_is_not_reopened() {
    let store = MockTurnStore::default();
    let mut previous = Session::new("web-4");
    previous.turn_count = 1;
    previous.last_activity = chrono::Utc::now() - chrono::Duration::hours(2);
    store.sessions.lock().unwrap().insert("web-4".to_string(), previous);
    let h = harness_with(test_config(), MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]), store);

    let response = h.pipeline.process("Anyone there?", Some("web-4")).await.unwrap();
    assert_ne!(response.session_id.as_deref(), Some("web-4"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_turns_on_stored_id_continue_numbering() {
    let store = MockTurnStore::default().with_lookup_delay(50);
    store.preload("web-7", 4);
    let h = harness_with(test_config(), MockIndex::with_hits(vec![hit("faq-1", 0.9, "q", "a")]), store);

    let first = h.pipeline.clone();
    let second = h.pipeline.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.process("first question", Some("web-7")).await.unwrap() }),
        tokio::spawn(async move { second.process("second question", Some("web-7")).await.unwrap() }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut numbers = vec![a.turn_number.unwrap(), b.turn_number.unwrap()];
    numbers.sort();
    assert_eq!(numbers, vec![5, 6]);
    assert!(a.persisted && b.persisted);

    let stored: Vec<u32> = h.store.turns_for("web-7").iter().map(|t| t.turn_number).collect();
    assert_eq!(stored, (1..=6).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_request_transfer_records_metadata() {
    let h = payment_harness(0.9);
    let id = h
        .pipeline
        .process("How can I pay?", None)
        .await
        .unwrap()
        .session_id
        .unwrap();

    let transfer_id = h.pipeline.request_transfer(&id, Some("billing dispute")).await.unwrap();
    assert_eq!(transfer_id.len(), 8);

    let session = h.pipeline.sessions().get(&id).await.unwrap();
    assert_eq!(session.metadata.get(MetadataKey::TransferRequested), Some("true"));
    assert_eq!(session.metadata.get(MetadataKey::TransferId), Some(transfer_id.as_str()));
    assert_eq!(session.metadata.get(MetadataKey::TransferReason), Some("billing dispute"));
    assert!(session.metadata.get(MetadataKey::TransferTime).is_some());
}

#[tokio::test]
async fn test_feedback_validation_and_storage() {
    let h = payment_harness(0.9);
    let id = h
        .pipeline
        .process("How can I pay?", None)
        .await
        .unwrap()
        .session_id
        .unwrap();

    let saved = h
        .pipeline
        .save_feedback(&id, Some(1), FeedbackKind::Helpful, Some("Quick answer".to_string()))
        .await
        .unwrap();
    assert_eq!(saved, 1);

    let too_long = "x".repeat(1001);
    let err = h
        .pipeline
        .save_feedback(&id, None, FeedbackKind::Other, Some(too_long))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .pipeline
        .save_feedback("ghost", None, FeedbackKind::Incorrect, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SessionNotFound(_)));
    assert_eq!(h.store.feedback.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_stats_summarise_turns() {
    let h = payment_harness(0.8);
    let first = h.pipeline.process("How can I pay?", None).await.unwrap();
    let id = first.session_id.unwrap();
    h.pipeline.process("Hello", Some(&id)).await.unwrap();

    let stats = h.pipeline.session_stats(&id).await.unwrap();
    assert_eq!(stats.total_turns, 2);
    assert_eq!(stats.intents_used, vec!["faq_match".to_string(), "greeting".to_string()]);
    assert!(stats.avg_confidence > 0.8 && stats.avg_confidence <= 1.0);
}

#[tokio::test]
async fn test_analytics_sees_every_processed_turn() {
    let h = payment_harness(0.82);
    let id = h
        .pipeline
        .process("How can I pay?", None)
        .await
        .unwrap()
        .session_id
        .unwrap();
    h.pipeline.process("Hello", Some(&id)).await.unwrap();
    h.pipeline.process("", Some(&id)).await.unwrap();

    let snapshot = h.pipeline.analytics_snapshot().await.unwrap();
    assert_eq!(snapshot.records, 2);
    assert_eq!(snapshot.intents["faq_match"].occurrences, 1);
    assert_eq!(snapshot.intents["greeting"].occurrences, 1);

    let period = snapshot.periods.values().next().unwrap();
    assert_eq!(period.turns, 2);
    assert_eq!(period.new_sessions, 1);

    let last = h.pipeline.shutdown().await.unwrap();
    assert_eq!(last.records, 2);
}
