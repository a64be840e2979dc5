//! Test doubles for the pipeline's collaborators.

use crate::actors::messages::{AppError, SearchHit};
use crate::actors::traits::{Embedder, TurnStore, VectorIndex};
use crate::config::PipelineConfig;
use crate::models::{ConversationTurn, Feedback, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Config with short timeouts and backoff so failure paths run fast.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        search_timeout_ms: 200,
        persistence_backoff_ms: 1,
        ..PipelineConfig::default()
    }
}

pub fn hit(id: &str, score: f32, question: &str, answer: &str) -> SearchHit {
    SearchHit {
        candidate_id: id.to_string(),
        score,
        question: question.to_string(),
        answer: answer.to_string(),
        category: Some("general".to_string()),
    }
}

/// Embeds text as a small bag-of-bytes vector; counts calls.
#[derive(Default)]
pub struct MockEmbedder {
    pub calls: AtomicUsize,
    pub should_fail: bool,
}

impl MockEmbedder {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            should_fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: String) -> Result<Vec<f32>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(AppError::SearchUnavailable("Mock embedder down".to_string()));
        }
        let mut vector = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 8] += byte as f32;
        }
        Ok(vector)
    }
}

/// Returns a fixed hit list for every query; counts searches.
#[derive(Default)]
pub struct MockIndex {
    pub hits: Vec<SearchHit>,
    pub calls: AtomicUsize,
    pub should_fail: bool,
    pub delay_ms: u64,
}

impl MockIndex {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn search(&self, _vector: Vec<f32>, top_k: usize) -> Result<Vec<SearchHit>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.should_fail {
            return Err(AppError::SearchUnavailable("Mock index down".to_string()));
        }
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

/// In-memory `TurnStore` with failure injection.
#[derive(Default)]
pub struct MockTurnStore {
    pub sessions: Mutex<HashMap<String, Session>>,
    pub turns: Mutex<Vec<ConversationTurn>>,
    pub feedback: Mutex<Vec<Feedback>>,
    /// Remaining `insert_turn` calls that fail with a transient error.
    pub transient_failures: AtomicU32,
    /// Every write fails with a non-transient error.
    pub broken: bool,
    pub insert_calls: AtomicUsize,
    /// Delay applied to session lookups (`load_session`, `max_turn_number`).
    pub lookup_delay_ms: u64,
}

impl MockTurnStore {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn flaky(failures: u32) -> Self {
        Self {
            transient_failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn with_lookup_delay(mut self, ms: u64) -> Self {
        self.lookup_delay_ms = ms;
        self
    }

    async fn lookup_delay(&self) {
        if self.lookup_delay_ms > 0 {
            sleep(Duration::from_millis(self.lookup_delay_ms)).await;
        }
    }

    pub fn turns_for(&self, session_id: &str) -> Vec<ConversationTurn> {
        let mut turns: Vec<ConversationTurn> = self
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        turns.sort_by_key(|t| t.turn_number);
        turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.lock().unwrap().len()
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Pretends an earlier process already stored `count` turns for the session.
    pub fn preload(&self, session_id: &str, count: u32) {
        let mut turns = self.turns.lock().unwrap();
        for n in 1..=count {
            turns.push(ConversationTurn {
                session_id: session_id.to_string(),
                turn_number: n,
                user_input: format!("earlier question {}", n),
                intent: "faq_match".to_string(),
                confidence: 0.9,
                emotion: crate::models::Emotion::Neutral,
                urgency: crate::models::Urgency::Low,
                bot_response: "earlier answer".to_string(),
                slots: Default::default(),
                need_human: false,
                latency_ms: 3,
                created_at: chrono::Utc::now(),
            });
        }
    }
}

#[async_trait]
impl TurnStore for MockTurnStore {
    async fn upsert_session(&self, session: &Session) -> Result<(), AppError> {
        if self.broken {
            return Err(AppError::Internal("Mock store is broken".to_string()));
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn insert_turn(&self, turn: &ConversationTurn) -> Result<(), AppError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(AppError::Internal("Mock store is broken".to_string()));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Timeout("Mock store busy".to_string()));
        }

        let mut turns = self.turns.lock().unwrap();
        let existing = turns
            .iter()
            .find(|t| t.session_id == turn.session_id && t.turn_number == turn.turn_number);
        match existing {
            Some(stored) if stored.user_input != turn.user_input || stored.bot_response != turn.bot_response => {
                Err(AppError::TurnConflict {
                    session_id: turn.session_id.clone(),
                    turn_number: turn.turn_number,
                })
            }
            Some(_) => Ok(()),
            None => {
                turns.push(turn.clone());
                Ok(())
            }
        }
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        self.lookup_delay().await;
        Ok(self.sessions.lock().unwrap().get(session_id).map(|session| Session {
            turns: Vec::new(),
            ..session.clone()
        }))
    }

    async fn max_turn_number(&self, session_id: &str) -> Result<u32, AppError> {
        self.lookup_delay().await;
        Ok(self
            .turns
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.session_id == session_id)
            .map(|t| t.turn_number)
            .max()
            .unwrap_or(0))
    }

    async fn save_feedback(&self, feedback: &Feedback) -> Result<i64, AppError> {
        if self.broken {
            return Err(AppError::Internal("Mock store is broken".to_string()));
        }
        let mut stored = self.feedback.lock().unwrap();
        stored.push(feedback.clone());
        Ok(stored.len() as i64)
    }
}
