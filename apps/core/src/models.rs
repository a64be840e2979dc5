use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::AppError;

/// Intent recorded when a semantic FAQ match clears the similarity threshold.
pub const INTENT_FAQ_MATCH: &str = "faq_match";
/// Intent recorded when the turn is handed over to human support.
pub const INTENT_ESCALATE: &str = "escalate";
/// Intent recorded for chit-chat answered from the preset reply list.
pub const INTENT_CASUAL: &str = "casual";

/// Clamps a confidence score into `[0, 1]`, mapping NaN to zero.
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Lifecycle state of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Closed,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            "closed" => Ok(SessionStatus::Closed),
            other => Err(AppError::Validation(format!("Unknown session status: {}", other))),
        }
    }
}

/// Current schema version of [`SessionMetadata`].
pub const METADATA_SCHEMA_VERSION: u16 = 1;

/// Recognised session metadata keys (schema version 1).
///
/// - `transfer_requested`: "true" once a human transfer was requested
/// - `transfer_id`: short id handed to the support desk
/// - `transfer_reason`: free text supplied with the transfer request
/// - `transfer_time`: RFC 3339 timestamp of the transfer request
/// - `end_reason`: why the session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    TransferRequested,
    TransferId,
    TransferReason,
    TransferTime,
    EndReason,
}

/// Typed, versioned key/value metadata attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub version: u16,
    #[serde(default)]
    pub entries: BTreeMap<MetadataKey, String>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl SessionMetadata {
    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn set(&mut self, key: MetadataKey, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }
}

/// Compact view of a turn kept in the session's bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    /// Assigned by the session store when the turn is appended.
    pub turn_number: u32,
    pub user_input: String,
    pub intent: String,
    pub confidence: f32,
    pub bot_response: String,
    pub need_human: bool,
    pub at: DateTime<Utc>,
}

impl TurnSummary {
    /// Builds a summary whose turn number is still unassigned.
    pub fn pending(
        user_input: impl Into<String>,
        intent: impl Into<String>,
        confidence: f32,
        bot_response: impl Into<String>,
        need_human: bool,
    ) -> Self {
        Self {
            turn_number: 0,
            user_input: user_input.into(),
            intent: intent.into(),
            confidence: clamp_confidence(confidence),
            bot_response: bot_response.into(),
            need_human,
            at: Utc::now(),
        }
    }
}

/// A conversation session as owned by the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
    /// Highest turn number assigned so far in this session.
    pub turn_count: u32,
    /// Most recent turns, never more than the configured maximum.
    pub turns: Vec<TurnSummary>,
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Active,
            turn_count: 0,
            turns: Vec::new(),
            metadata: SessionMetadata::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Which classifier produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierSource {
    Pattern,
    Casual,
    Semantic,
    Reserved,
}

impl ClassifierSource {
    pub fn label(&self) -> &'static str {
        match self {
            ClassifierSource::Pattern => "pattern",
            ClassifierSource::Casual => "casual",
            ClassifierSource::Semantic => "semantic",
            ClassifierSource::Reserved => "reserved",
        }
    }
}

/// Transient classification outcome; collapses into the turn's intent/confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMatch {
    pub intent: String,
    pub confidence: f32,
    pub source: ClassifierSource,
    /// Reply chosen by the classifier, when it answers directly.
    pub reply: Option<String>,
    pub need_human: bool,
    pub slots: BTreeMap<String, String>,
}

impl IntentMatch {
    pub fn new(intent: impl Into<String>, confidence: f32, source: ClassifierSource) -> Self {
        Self {
            intent: intent.into(),
            confidence: clamp_confidence(confidence),
            source,
            reply: None,
            need_human: false,
            slots: BTreeMap::new(),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    pub fn with_slot(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.insert(key.into(), value.into());
        self
    }

    pub fn escalating(mut self) -> Self {
        self.need_human = true;
        self
    }
}

/// Emotion label attached to a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Positive,
    Negative,
    Neutral,
}

impl Emotion {
    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Positive => "positive",
            Emotion::Negative => "negative",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Emotion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Emotion::Positive),
            "negative" => Ok(Emotion::Negative),
            "neutral" => Ok(Emotion::Neutral),
            other => Err(AppError::Validation(format!("Unknown emotion label: {}", other))),
        }
    }
}

/// Urgency label attached to a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn label(&self) -> &'static str {
        match self {
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Low => "low",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Urgency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Urgency::High),
            "medium" => Ok(Urgency::Medium),
            "low" => Ok(Urgency::Low),
            other => Err(AppError::Validation(format!("Unknown urgency label: {}", other))),
        }
    }
}

/// Immutable record of one request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    pub turn_number: u32,
    pub user_input: String,
    pub intent: String,
    pub confidence: f32,
    pub emotion: Emotion,
    pub urgency: Urgency,
    pub bot_response: String,
    pub slots: BTreeMap<String, String>,
    pub need_human: bool,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Kind of feedback a user can leave on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Helpful,
    NotHelpful,
    Incorrect,
    Other,
}

impl FeedbackKind {
    pub fn label(&self) -> &'static str {
        match self {
            FeedbackKind::Helpful => "helpful",
            FeedbackKind::NotHelpful => "not_helpful",
            FeedbackKind::Incorrect => "incorrect",
            FeedbackKind::Other => "other",
        }
    }
}

/// User feedback on a session, optionally tied to one turn.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Feedback {
    #[validate(length(min = 1))]
    pub session_id: String,
    pub turn_number: Option<u32>,
    pub kind: FeedbackKind,
    #[validate(length(max = 1000))]
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate view over one session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub total_turns: u32,
    pub intents_used: Vec<String>,
    pub avg_confidence: f32,
}

/// What the transport hands back to the user after a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub session_id: Option<String>,
    pub reply_text: String,
    pub intent: String,
    pub confidence: f32,
    pub emotion: Emotion,
    pub urgency: Urgency,
    pub need_human: bool,
    pub turn_number: Option<u32>,
    pub slots: BTreeMap<String, String>,
    pub new_session: bool,
    pub persisted: bool,
}
