use crate::actors::analytics::{AnalyticsHandle, AnalyticsSnapshot};
use crate::actors::messages::AppError;
use crate::actors::traits::{Embedder, TurnStore, VectorIndex};
use crate::brain::{EmotionUrgencyScorer, IntentRouter, RouteDecision, SearchOutcome, SemanticSearchClient};
use crate::config::PipelineConfig;
use crate::models::{
    ClassifierSource, Emotion, Feedback, FeedbackKind, IntentMatch, Session, SessionStats, TurnResponse,
    TurnSummary, Urgency, INTENT_ESCALATE, INTENT_FAQ_MATCH,
};
use crate::recorder::TurnRecorder;
use crate::session_store::SessionStore;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use validator::Validate;

pub const WELCOME_MESSAGE: &str = "I'd be happy to help! Please let me know what you'd like to know about.";
pub const ESCALATION_MESSAGE: &str =
    "I'm not sure I have the right answer for that. I'll connect you with our support team.";
/// Intent reported for the empty-input short-circuit. Never recorded.
pub const INTENT_WELCOME: &str = "welcome";

struct PipelineInner {
    config: PipelineConfig,
    sessions: SessionStore,
    router: IntentRouter,
    search: SemanticSearchClient,
    scorer: EmotionUrgencyScorer,
    recorder: TurnRecorder,
    store: Arc<dyn TurnStore>,
    analytics: AnalyticsHandle,
}

/// Entry point of the dialog pipeline. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DialogPipeline {
    inner: Arc<PipelineInner>,
}

impl DialogPipeline {
    /// Wires the pipeline around its collaborators and spawns the analytics consumer.
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn TurnStore>,
    ) -> Self {
        let router = IntentRouter::from_config(&config);
        Self::with_router(config, router, embedder, index, store)
    }

    /// Same as [`DialogPipeline::new`] with a caller-assembled classifier chain.
    pub fn with_router(
        config: PipelineConfig,
        router: IntentRouter,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn TurnStore>,
    ) -> Self {
        info!("Dialog pipeline classifiers: {:?}", router.classifier_names());
        let inner = PipelineInner {
            sessions: SessionStore::from_config(&config),
            search: SemanticSearchClient::new(embedder, index, &config),
            scorer: EmotionUrgencyScorer::new(&config.keyword_rules),
            recorder: TurnRecorder::from_config(store.clone(), &config),
            analytics: AnalyticsHandle::new(config.analytics_queue_capacity),
            router,
            store,
            config,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Answers one utterance.
    ///
    /// Classification, search and persistence problems degrade the answer or
    /// are reported through `persisted`; only internal failures of the session
    /// store surface as `Err`.
    #[instrument(skip(self, text), fields(session = session_id.unwrap_or("-")))]
    pub async fn process(&self, text: &str, session_id: Option<&str>) -> Result<TurnResponse, AppError> {
        let started = Instant::now();
        let inner = &self.inner;

        let decision = inner.router.route(text);
        if matches!(decision, RouteDecision::Welcome) {
            return Ok(self.welcome(session_id).await);
        }

        let (mut session, mut new_session) = self.resolve(session_id).await?;

        // Scoring is pure and independent of which reply gets selected.
        let (selected, (emotion, urgency)) =
            tokio::join!(self.select_response(text, decision), async { inner.scorer.score(text) });
        let reply = selected
            .reply
            .clone()
            .unwrap_or_else(|| ESCALATION_MESSAGE.to_string());

        let summary = TurnSummary::pending(text, &selected.intent, selected.confidence, &reply, selected.need_human);
        let mut attempts = 0;
        let session = loop {
            attempts += 1;
            match inner.sessions.mutate(&session.id, summary.clone()).await {
                Ok(updated) => break updated,
                Err(e @ (AppError::SessionFull { .. } | AppError::SessionExpired(_))) if attempts < 3 => {
                    info!("{}; starting a new session", e);
                    let (fresh, _) = self.resolve(Some(&session.id)).await?;
                    session = fresh;
                    new_session = true;
                }
                Err(e) => return Err(e),
            }
        };

        let recorded = inner
            .recorder
            .record(&session, &selected, emotion, urgency, &reply, started.elapsed())
            .await?;
        inner.analytics.enqueue(&recorded.turn);

        let turn = &recorded.turn;
        info!(
            "Turn {}#{} intent={} source={} confidence={:.2} emotion={} urgency={} need_human={} persisted={}",
            short_id(&turn.session_id),
            turn.turn_number,
            turn.intent,
            selected.source.label(),
            turn.confidence,
            turn.emotion,
            turn.urgency,
            turn.need_human,
            recorded.persisted()
        );

        Ok(TurnResponse {
            session_id: Some(session.id.clone()),
            reply_text: reply,
            intent: turn.intent.clone(),
            confidence: turn.confidence,
            emotion,
            urgency,
            need_human: turn.need_human,
            turn_number: Some(turn.turn_number),
            slots: turn.slots.clone(),
            new_session,
            persisted: recorded.persisted(),
        })
    }

    async fn welcome(&self, session_id: Option<&str>) -> TurnResponse {
        let live = match session_id {
            Some(id) => self.inner.sessions.live(id).await.map(|s| s.id),
            None => None,
        };
        TurnResponse {
            session_id: live,
            reply_text: WELCOME_MESSAGE.to_string(),
            intent: INTENT_WELCOME.to_string(),
            confidence: 1.0,
            emotion: Emotion::Neutral,
            urgency: Urgency::Low,
            need_human: false,
            turn_number: None,
            slots: BTreeMap::new(),
            new_session: false,
            persisted: false,
        }
    }

    /// Resolves the session. Ids the store has not seen since start-up are
    /// checked against persistence: ended sessions are not reopened and
    /// resumed ones continue their numbering.
    async fn resolve(&self, session_id: Option<&str>) -> Result<(Session, bool), AppError> {
        let store = self.inner.store.clone();
        self.inner
            .sessions
            .resolve_with(session_id, move |id| async move { stored_session(store.as_ref(), &id).await })
            .await
    }

    async fn select_response(&self, text: &str, decision: RouteDecision) -> IntentMatch {
        match decision {
            RouteDecision::Matched(matched) => matched,
            RouteDecision::Welcome | RouteDecision::NoConfidentIntent { .. } => {
                match self.inner.search.query(text).await {
                    SearchOutcome::Match(hit) => {
                        let mut matched = IntentMatch::new(INTENT_FAQ_MATCH, hit.score, ClassifierSource::Semantic)
                            .with_reply(hit.answer)
                            .with_slot("faq_id", hit.candidate_id)
                            .with_slot("matched_question", hit.question);
                        if let Some(category) = hit.category {
                            matched = matched.with_slot("category", category);
                        }
                        matched
                    }
                    SearchOutcome::NoConfidentMatch { best_score } => {
                        IntentMatch::new(INTENT_ESCALATE, best_score, ClassifierSource::Semantic)
                            .with_reply(ESCALATION_MESSAGE)
                            .with_slot("reason", "no_confident_match")
                            .escalating()
                    }
                    SearchOutcome::Unavailable { .. } => {
                        IntentMatch::new(INTENT_ESCALATE, 0.0, ClassifierSource::Semantic)
                            .with_reply(ESCALATION_MESSAGE)
                            .with_slot("reason", "search_unavailable")
                            .escalating()
                    }
                }
            }
        }
    }

    /// Closes a session and persists its final state.
    pub async fn end_session(&self, session_id: &str, reason: &str) -> Result<Session, AppError> {
        let session = self.inner.sessions.close(session_id, reason).await?;
        self.inner.store.upsert_session(&session).await?;
        Ok(session)
    }

    /// Flags a session for a human agent. Returns the transfer id.
    pub async fn request_transfer(&self, session_id: &str, reason: Option<&str>) -> Result<String, AppError> {
        let (session, transfer_id) = self
            .inner
            .sessions
            .request_transfer(session_id, reason.unwrap_or("user_request"))
            .await?;
        self.inner.store.upsert_session(&session).await?;
        Ok(transfer_id)
    }

    /// Validates and stores feedback on a known session. Returns the feedback id.
    pub async fn save_feedback(
        &self,
        session_id: &str,
        turn_number: Option<u32>,
        kind: FeedbackKind,
        text: Option<String>,
    ) -> Result<i64, AppError> {
        let feedback = Feedback {
            session_id: session_id.to_string(),
            turn_number,
            kind,
            text,
            created_at: Utc::now(),
        };
        feedback.validate()?;

        let session = self
            .inner
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;
        self.inner.store.upsert_session(&session).await?;
        let id = self.inner.store.save_feedback(&feedback).await?;
        info!("Feedback {} ({}) saved for session {}", id, kind.label(), short_id(session_id));
        Ok(id)
    }

    pub async fn session_stats(&self, session_id: &str) -> Result<SessionStats, AppError> {
        self.inner.sessions.stats(session_id).await
    }

    pub async fn analytics_snapshot(&self) -> Result<AnalyticsSnapshot, AppError> {
        self.inner.analytics.snapshot().await
    }

    /// Records dropped because the analytics queue was full.
    pub fn analytics_dropped(&self) -> u64 {
        self.inner.analytics.dropped()
    }

    /// Drains the analytics queue and stops its consumer.
    pub async fn shutdown(&self) -> Result<AnalyticsSnapshot, AppError> {
        let snapshot = self.inner.analytics.shutdown().await?;
        info!(
            "Dialog pipeline stopped: {} turns aggregated, {} dropped",
            snapshot.records,
            self.inner.analytics.dropped()
        );
        Ok(snapshot)
    }
}

/// What persistence knows about `id`, with the turn counter raised to the
/// highest turn number ever stored for it.
async fn stored_session(store: &dyn TurnStore, id: &str) -> Option<Session> {
    let session = store.load_session(id).await.unwrap_or_else(|e| {
        warn!("Could not load stored session {}: {}", id, e);
        None
    });
    let last_turn = store.max_turn_number(id).await.unwrap_or_else(|e| {
        warn!("Could not read previous turns of session {}: {}", id, e);
        0
    });

    match session {
        Some(mut session) => {
            session.turn_count = session.turn_count.max(last_turn);
            Some(session)
        }
        None if last_turn > 0 => {
            let mut session = Session::new(id);
            session.turn_count = last_turn;
            Some(session)
        }
        None => None,
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
