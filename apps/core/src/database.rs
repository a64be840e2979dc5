use crate::actors::messages::AppError;
use crate::actors::traits::TurnStore;
use crate::models::{ConversationTurn, Feedback, Session, SessionMetadata};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        metadata JSON NOT NULL,
        turn_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversation_turns (
        turn_id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        turn_number INTEGER NOT NULL,
        user_input TEXT NOT NULL,
        intent TEXT NOT NULL,
        confidence REAL NOT NULL,
        bot_response TEXT NOT NULL,
        slots JSON NOT NULL,
        emotion TEXT NOT NULL,
        urgency TEXT NOT NULL,
        need_human INTEGER NOT NULL,
        processing_time_ms INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(session_id, turn_number),
        FOREIGN KEY(session_id) REFERENCES sessions(session_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_feedback (
        feedback_id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        turn_number INTEGER,
        feedback_type TEXT NOT NULL,
        feedback_text TEXT,
        created_at INTEGER NOT NULL,
        FOREIGN KEY(session_id) REFERENCES sessions(session_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_turns_session ON conversation_turns(session_id, turn_number)",
];

/// Opens (creating if missing) the SQLite database at `path` and applies the schema.
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let db_url = format!("sqlite://{}", path.to_string_lossy());
    info!("Initializing database at: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database initialized and migrations applied.");
    Ok(())
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

#[derive(Debug, sqlx::FromRow)]
struct TurnRow {
    session_id: String,
    turn_number: i64,
    user_input: String,
    intent: String,
    confidence: f64,
    bot_response: String,
    slots: Json<BTreeMap<String, String>>,
    emotion: String,
    urgency: String,
    need_human: bool,
    processing_time_ms: i64,
    created_at: i64,
}

impl TryFrom<TurnRow> for ConversationTurn {
    type Error = AppError;

    fn try_from(row: TurnRow) -> Result<Self, Self::Error> {
        Ok(ConversationTurn {
            session_id: row.session_id,
            turn_number: u32::try_from(row.turn_number)
                .map_err(|_| AppError::Internal(format!("Invalid turn number {}", row.turn_number)))?,
            user_input: row.user_input,
            intent: row.intent,
            confidence: row.confidence as f32,
            emotion: row.emotion.parse()?,
            urgency: row.urgency.parse()?,
            bot_response: row.bot_response,
            slots: row.slots.0,
            need_human: row.need_human,
            latency_ms: row.processing_time_ms.max(0) as u64,
            created_at: from_millis(row.created_at),
        })
    }
}

/// All persisted turns of a session, in turn order.
pub async fn get_session_turns(pool: &SqlitePool, session_id: &str) -> Result<Vec<ConversationTurn>, AppError> {
    let rows = sqlx::query_as::<_, TurnRow>(
        r#"
        SELECT session_id, turn_number, user_input, intent, confidence, bot_response,
               slots, emotion, urgency, need_human, processing_time_ms, created_at
        FROM conversation_turns
        WHERE session_id = ?
        ORDER BY turn_number ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ConversationTurn::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    status: String,
    metadata: Json<SessionMetadata>,
    turn_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.session_id,
            created_at: from_millis(row.created_at),
            last_activity: from_millis(row.updated_at),
            status: row.status.parse()?,
            turn_count: u32::try_from(row.turn_count)
                .map_err(|_| AppError::Internal(format!("Invalid turn count {}", row.turn_count)))?,
            turns: Vec::new(),
            metadata: row.metadata.0,
        })
    }
}

/// `TurnStore` backed by a SQLite pool.
#[derive(Clone)]
pub struct SqliteTurnStore {
    pool: SqlitePool,
}

impl SqliteTurnStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    async fn upsert_session(&self, session: &Session) -> Result<(), AppError> {
        // turn_count never moves backwards when snapshots race.
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, status, metadata, turn_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                status = excluded.status,
                metadata = excluded.metadata,
                turn_count = MAX(sessions.turn_count, excluded.turn_count),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.id)
        .bind(session.status.label())
        .bind(Json(&session.metadata))
        .bind(session.turn_count as i64)
        .bind(session.created_at.timestamp_millis())
        .bind(session.last_activity.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_turn(&self, turn: &ConversationTurn) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO conversation_turns
                (session_id, turn_number, user_input, intent, confidence, bot_response,
                 slots, emotion, urgency, need_human, processing_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&turn.session_id)
        .bind(turn.turn_number as i64)
        .bind(&turn.user_input)
        .bind(&turn.intent)
        .bind(turn.confidence as f64)
        .bind(&turn.bot_response)
        .bind(Json(&turn.slots))
        .bind(turn.emotion.label())
        .bind(turn.urgency.label())
        .bind(turn.need_human)
        .bind(turn.latency_ms as i64)
        .bind(turn.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let (user_input, bot_response): (String, String) = sqlx::query_as(
                "SELECT user_input, bot_response FROM conversation_turns WHERE session_id = ? AND turn_number = ?",
            )
            .bind(&turn.session_id)
            .bind(turn.turn_number as i64)
            .fetch_one(&self.pool)
            .await?;

            if user_input != turn.user_input || bot_response != turn.bot_response {
                warn!("Turn {}#{} collides with a stored turn", turn.session_id, turn.turn_number);
                return Err(AppError::TurnConflict {
                    session_id: turn.session_id.clone(),
                    turn_number: turn.turn_number,
                });
            }
            debug!("Turn {}#{} already stored", turn.session_id, turn.turn_number);
        }
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, status, metadata, turn_count, created_at, updated_at
            FROM sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn max_turn_number(&self, session_id: &str) -> Result<u32, AppError> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(turn_number) FROM conversation_turns WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.and_then(|n| u32::try_from(n).ok()).unwrap_or(0))
    }

    async fn save_feedback(&self, feedback: &Feedback) -> Result<i64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_feedback (session_id, turn_number, feedback_type, feedback_text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&feedback.session_id)
        .bind(feedback.turn_number.map(i64::from))
        .bind(feedback.kind.label())
        .bind(feedback.text.as_deref())
        .bind(feedback.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
