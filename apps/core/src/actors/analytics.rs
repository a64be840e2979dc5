use crate::actors::messages::{ActorError, AnalyticsMessage, AppError};
use crate::models::{ConversationTurn, Emotion, Urgency};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Incremental mean: `avg += (value - avg) / count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMean {
    pub count: u64,
    pub mean: f64,
}

impl RunningMean {
    pub fn observe(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    /// Combines two means weighted by their counts. Order independent.
    pub fn merge(&mut self, other: &RunningMean) {
        let total = self.count + other.count;
        if total == 0 {
            return;
        }
        self.mean = (self.mean * self.count as f64 + other.mean * other.count as f64) / total as f64;
        self.count = total;
    }
}

/// Occurrences and average confidence for one intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentAccumulator {
    pub occurrences: u64,
    pub confidence: RunningMean,
}

impl IntentAccumulator {
    pub fn avg_confidence(&self) -> f64 {
        self.confidence.mean
    }

    fn merge(&mut self, other: &IntentAccumulator) {
        self.occurrences += other.occurrences;
        self.confidence.merge(&other.confidence);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionCounts {
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrgencyCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

/// Daily roll-up across all sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodAccumulator {
    pub turns: u64,
    pub new_sessions: u64,
    pub escalations: u64,
    pub confidence: RunningMean,
    pub latency_ms: RunningMean,
    pub emotions: EmotionCounts,
    pub urgencies: UrgencyCounts,
}

impl PeriodAccumulator {
    fn observe(&mut self, turn: &ConversationTurn) {
        self.turns += 1;
        if turn.turn_number == 1 {
            self.new_sessions += 1;
        }
        if turn.need_human {
            self.escalations += 1;
        }
        self.confidence.observe(turn.confidence as f64);
        self.latency_ms.observe(turn.latency_ms as f64);
        match turn.emotion {
            Emotion::Positive => self.emotions.positive += 1,
            Emotion::Negative => self.emotions.negative += 1,
            Emotion::Neutral => self.emotions.neutral += 1,
        }
        match turn.urgency {
            Urgency::High => self.urgencies.high += 1,
            Urgency::Medium => self.urgencies.medium += 1,
            Urgency::Low => self.urgencies.low += 1,
        }
    }

    fn merge(&mut self, other: &PeriodAccumulator) {
        self.turns += other.turns;
        self.new_sessions += other.new_sessions;
        self.escalations += other.escalations;
        self.confidence.merge(&other.confidence);
        self.latency_ms.merge(&other.latency_ms);
        self.emotions.positive += other.emotions.positive;
        self.emotions.negative += other.emotions.negative;
        self.emotions.neutral += other.emotions.neutral;
        self.urgencies.high += other.urgencies.high;
        self.urgencies.medium += other.urgencies.medium;
        self.urgencies.low += other.urgencies.low;
    }
}

/// Per-intent and per-day statistics folded from turn records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub records: u64,
    pub intents: BTreeMap<String, IntentAccumulator>,
    pub periods: BTreeMap<NaiveDate, PeriodAccumulator>,
}

impl AnalyticsSnapshot {
    pub fn observe(&mut self, turn: &ConversationTurn) {
        self.records += 1;

        let intent = self.intents.entry(turn.intent.clone()).or_default();
        intent.occurrences += 1;
        intent.confidence.observe(turn.confidence as f64);

        self.periods
            .entry(turn.created_at.date_naive())
            .or_default()
            .observe(turn);
    }

    /// Folds another snapshot into this one. `a.merge(b)` equals `b.merge(a)`.
    pub fn merge(&mut self, other: &AnalyticsSnapshot) {
        self.records += other.records;
        for (intent, acc) in &other.intents {
            self.intents.entry(intent.clone()).or_default().merge(acc);
        }
        for (day, acc) in &other.periods {
            self.periods.entry(*day).or_default().merge(acc);
        }
    }
}

/// A handle to the `AnalyticsActor`.
///
/// `enqueue` never blocks: when the queue is full the record is dropped and counted.
#[derive(Clone)]
pub struct AnalyticsHandle {
    sender: mpsc::Sender<AnalyticsMessage>,
    dropped: Arc<AtomicU64>,
}

impl AnalyticsHandle {
    /// Spawns the consumer task with a bounded queue of `capacity` records.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let actor = AnalyticsRunner::new(receiver);
        tokio::spawn(async move { actor.run().await });
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fire-and-forget. Returns whether the record was queued.
    pub fn enqueue(&self, turn: &ConversationTurn) -> bool {
        match self
            .sender
            .try_send(AnalyticsMessage::Record(Box::new(turn.clone())))
        {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Analytics queue full, dropping turn {}#{} ({} dropped so far)",
                    turn.session_id, turn.turn_number, dropped
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Analytics actor stopped, dropping turn {}#{}", turn.session_id, turn.turn_number);
                false
            }
        }
    }

    /// Number of records dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current accumulators, including every record queued before this call.
    pub async fn snapshot(&self) -> Result<AnalyticsSnapshot, AppError> {
        let (send, recv) = oneshot::channel();
        self.request(AnalyticsMessage::Snapshot { responder: send }, recv).await
    }

    /// Stops the actor after it has folded everything queued so far.
    pub async fn shutdown(&self) -> Result<AnalyticsSnapshot, AppError> {
        let (send, recv) = oneshot::channel();
        self.request(AnalyticsMessage::Shutdown { responder: send }, recv).await
    }

    async fn request(
        &self,
        msg: AnalyticsMessage,
        recv: oneshot::Receiver<AnalyticsSnapshot>,
    ) -> Result<AnalyticsSnapshot, AppError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| AppError::Actor(ActorError::AnalyticsError("Analytics actor closed".to_string())))?;
        Ok(timeout(Duration::from_secs(5), recv)
            .await
            .map_err(ActorError::from)?
            .map_err(|_| {
                AppError::Actor(ActorError::AnalyticsError(
                    "Analytics actor failed to respond".to_string(),
                ))
            })?)
    }
}

// --- Actor Runner (Internal Logic) ---
struct AnalyticsRunner {
    receiver: mpsc::Receiver<AnalyticsMessage>,
    snapshot: AnalyticsSnapshot,
}

impl AnalyticsRunner {
    fn new(receiver: mpsc::Receiver<AnalyticsMessage>) -> Self {
        Self {
            receiver,
            snapshot: AnalyticsSnapshot::default(),
        }
    }

    async fn run(mut self) {
        info!("AnalyticsActor started");
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                AnalyticsMessage::Record(turn) => self.fold(&turn),
                AnalyticsMessage::Snapshot { responder } => {
                    if responder.send(self.snapshot.clone()).is_err() {
                        warn!("Failed to send analytics snapshot (channel closed)");
                    }
                }
                AnalyticsMessage::Shutdown { responder } => {
                    info!("AnalyticsActor shutting down after {} records", self.snapshot.records);
                    let _ = responder.send(self.snapshot.clone());
                    break;
                }
            }
        }
        info!("AnalyticsActor stopped");
    }

    fn fold(&mut self, turn: &ConversationTurn) {
        if !turn.confidence.is_finite() {
            warn!(
                "Skipping analytics for turn {}#{}: non-finite confidence",
                turn.session_id, turn.turn_number
            );
            return;
        }
        self.snapshot.observe(turn);
        debug!("Analytics folded turn {}#{}", turn.session_id, turn.turn_number);
    }
}
