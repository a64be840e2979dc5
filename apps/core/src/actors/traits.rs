use crate::actors::messages::{AppError, SearchHit};
use crate::models::{ConversationTurn, Feedback, Session};
use async_trait::async_trait;

/// Turns text into a dense vector.
///
/// Abstracts the embedding backend (local ONNX model, remote service, test double).
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    async fn embed(&self, text: String) -> Result<Vec<f32>, AppError>;
}

/// Nearest-neighbour search over the FAQ knowledge base.
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    /// Returns at most `top_k` hits, highest similarity first.
    async fn search(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<SearchHit>, AppError>;
}

/// Durable storage for session state and turn records.
#[async_trait]
pub trait TurnStore: Send + Sync + 'static {
    /// Inserts or replaces the session row keyed by session id.
    async fn upsert_session(&self, session: &Session) -> Result<(), AppError>;

    /// Appends a turn. Re-inserting an identical turn is a no-op; a different
    /// turn under an existing `(session_id, turn_number)` is a `TurnConflict`.
    async fn insert_turn(&self, turn: &ConversationTurn) -> Result<(), AppError>;

    /// The stored session row, without turn history.
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, AppError>;

    /// Highest persisted turn number for the session, 0 when none.
    async fn max_turn_number(&self, session_id: &str) -> Result<u32, AppError>;

    /// Stores user feedback and returns its id.
    async fn save_feedback(&self, feedback: &Feedback) -> Result<i64, AppError>;
}
