use crate::actors::traits::TurnStore;
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::{clamp_confidence, ConversationTurn, Emotion, IntentMatch, Session, Urgency};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Upper bound on a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A turn record plus the outcome of persisting it.
#[derive(Debug, Clone)]
pub struct RecordedTurn {
    pub turn: ConversationTurn,
    /// `PersistenceFailed` when every attempt failed. The turn is still valid.
    pub persist_error: Option<AppError>,
}

impl RecordedTurn {
    pub fn persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// Builds the immutable turn record and writes it to the turn store.
pub struct TurnRecorder {
    store: Arc<dyn TurnStore>,
    max_attempts: u32,
    backoff: Duration,
}

impl TurnRecorder {
    pub fn new(store: Arc<dyn TurnStore>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(store: Arc<dyn TurnStore>, config: &PipelineConfig) -> Self {
        Self::new(store, config.persistence_max_attempts, config.persistence_backoff())
    }

    /// Delay before retrying after failed `attempt` (1-based).
    fn retry_delay(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Records the latest turn of `session`, which must already carry it.
    ///
    /// The turn number is the session's counter after the mutation, i.e. the
    /// previous maximum plus one. Persistence errors are reported in the
    /// returned value, never as `Err`.
    pub async fn record(
        &self,
        session: &Session,
        intent: &IntentMatch,
        emotion: Emotion,
        urgency: Urgency,
        response: &str,
        latency: Duration,
    ) -> Result<RecordedTurn, AppError> {
        let summary = session
            .turns
            .last()
            .filter(|t| t.turn_number == session.turn_count)
            .ok_or_else(|| {
                AppError::InvalidInput(format!("Session {} has no pending turn to record", session.id))
            })?;

        let turn = ConversationTurn {
            session_id: session.id.clone(),
            turn_number: session.turn_count,
            user_input: summary.user_input.clone(),
            intent: intent.intent.clone(),
            confidence: clamp_confidence(intent.confidence),
            emotion,
            urgency,
            bot_response: response.to_string(),
            slots: intent.slots.clone(),
            need_human: intent.need_human,
            latency_ms: latency.as_millis() as u64,
            created_at: Utc::now(),
        };

        let persist_error = self.persist(session, &turn).await.err();
        Ok(RecordedTurn { turn, persist_error })
    }

    /// Writes session state and the turn, retrying transient failures with
    /// exponential backoff. Turn inserts are idempotent, so a retry after a
    /// lost acknowledgement cannot duplicate or renumber the turn.
    pub async fn persist(&self, session: &Session, turn: &ConversationTurn) -> Result<(), AppError> {
        let mut attempt = 1;
        loop {
            let result = match self.store.upsert_session(session).await {
                Ok(()) => self.store.insert_turn(turn).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    if attempt > 1 {
                        debug!("Turn {}#{} stored on attempt {}", turn.session_id, turn.turn_number, attempt);
                    }
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        "Persisting turn {}#{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        turn.session_id, turn.turn_number, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Giving up on turn {}#{} after {} attempt(s): {}",
                        turn.session_id, turn.turn_number, attempt, e
                    );
                    return Err(AppError::PersistenceFailed {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
