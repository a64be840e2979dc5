use crate::actors::analytics::AnalyticsSnapshot;
use crate::models::ConversationTurn;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Defines errors that can occur within the actor system.
#[derive(Debug, thiserror::Error, Serialize, Clone)]
pub enum ActorError {
    /// An error originating from the analytics actor.
    #[error("Analytics request failed: {0}")]
    AnalyticsError(String),
    /// A generic internal error within an actor.
    #[error("Internal system error: {0}")]
    Internal(String),
    /// An error indicating that an actor operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<tokio::time::error::Elapsed> for ActorError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ActorError::Timeout(format!("Actor operation timed out: {}", err))
    }
}

// Re-export AppError for convenience
pub use crate::error::AppError;

/// One nearest-neighbour candidate returned by a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub candidate_id: String,
    /// Similarity in `[0, 1]`, higher is closer.
    pub score: f32,
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
}

/// Messages that can be sent to the `AnalyticsActor`.
#[derive(Debug)]
pub enum AnalyticsMessage {
    /// Fold one finished turn into the accumulators.
    Record(Box<ConversationTurn>),
    /// A request for a copy of the current accumulators.
    Snapshot {
        responder: oneshot::Sender<AnalyticsSnapshot>,
    },
    /// Drain whatever is queued, then stop. The responder fires once stopped.
    Shutdown {
        responder: oneshot::Sender<AnalyticsSnapshot>,
    },
}
