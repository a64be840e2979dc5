use std::io;
use thiserror::Error;

/// Application-wide error type, consolidating all possible errors into a single enum.
#[derive(Debug, Error)]
pub enum AppError {
    /// Represents errors originating from the database, typically from `sqlx`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents standard input/output errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Represents errors specific to the actor system, such as communication failures.
    #[error("Actor error: {0}")]
    Actor(#[from] crate::actors::messages::ActorError),

    /// The session's TTL elapsed since it was last resolved. The caller must re-resolve.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The session already holds the configured maximum number of turns.
    /// The session has been closed; the caller starts a new one.
    #[error("Session {session_id} is full ({max_turns} turns)")]
    SessionFull { session_id: String, max_turns: usize },

    /// No live or closed session exists under this id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Embedding or vector search failed or timed out.
    #[error("Semantic search unavailable: {0}")]
    SearchUnavailable(String),

    /// A turn record could not be persisted after all retry attempts.
    #[error("Persistence failed after {attempts} attempt(s): {reason}")]
    PersistenceFailed { attempts: u32, reason: String },

    /// A different turn is already stored under this number.
    #[error("Turn {turn_number} of session {session_id} already stored with different content")]
    TurnConflict { session_id: String, turn_number: u32 },

    /// Empty or malformed user input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Represents data validation errors (e.g., invalid input format).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Represents configuration-related errors (e.g., missing environment variables).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Represents unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Represents errors from operations that did not complete in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl AppError {
    /// Whether a persistence attempt that failed with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => {
                    let msg = db.message().to_ascii_lowercase();
                    msg.contains("locked") || msg.contains("busy")
                }
                sqlx::Error::Protocol(msg) => {
                    let msg = msg.to_ascii_lowercase();
                    msg.contains("locked") || msg.contains("busy")
                }
                _ => false,
            },
            AppError::Io(_) | AppError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::Database(e) => AppError::Database(sqlx::Error::Protocol(e.to_string())),
            AppError::Io(e) => AppError::Io(io::Error::new(e.kind(), e.to_string())),
            AppError::Actor(e) => AppError::Actor(e.clone()),
            AppError::SessionExpired(s) => AppError::SessionExpired(s.clone()),
            AppError::SessionFull {
                session_id,
                max_turns,
            } => AppError::SessionFull {
                session_id: session_id.clone(),
                max_turns: *max_turns,
            },
            AppError::SessionNotFound(s) => AppError::SessionNotFound(s.clone()),
            AppError::SearchUnavailable(s) => AppError::SearchUnavailable(s.clone()),
            AppError::PersistenceFailed { attempts, reason } => AppError::PersistenceFailed {
                attempts: *attempts,
                reason: reason.clone(),
            },
            AppError::TurnConflict {
                session_id,
                turn_number,
            } => AppError::TurnConflict {
                session_id: session_id.clone(),
                turn_number: *turn_number,
            },
            AppError::InvalidInput(s) => AppError::InvalidInput(s.clone()),
            AppError::Validation(s) => AppError::Validation(s.clone()),
            AppError::Config(s) => AppError::Config(s.clone()),
            AppError::Internal(s) => AppError::Internal(s.clone()),
            AppError::Timeout(s) => AppError::Timeout(s.clone()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(format!("Operation timed out: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation errors: {}", err))
    }
}

impl From<lancedb::Error> for AppError {
    fn from(err: lancedb::Error) -> Self {
        AppError::SearchUnavailable(format!("LanceDB error: {}", err))
    }
}

impl From<arrow::error::ArrowError> for AppError {
    fn from(err: arrow::error::ArrowError) -> Self {
        AppError::Internal(format!("Arrow error: {}", err))
    }
}
