use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::{MetadataKey, Session, SessionStats, SessionStatus, TurnSummary};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

type SessionSlot = Arc<Mutex<Session>>;

/// How many evicted ids are remembered so they are never reopened.
const RETIRED_ID_CAPACITY: usize = 10_000;

/// Bounded FIFO set of ids whose sessions ended and were evicted.
#[derive(Default)]
struct RetiredIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl RetiredIds {
    fn insert(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > RETIRED_ID_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

/// In-memory owner of all live sessions.
///
/// The map lock is only held to look up or insert a slot; each session has
/// its own async mutex, so turns on different sessions never contend and
/// turns on the same session are serialized.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    retired: StdMutex<RetiredIds>,
    ttl: Duration,
    max_turns: usize,
    sweep_interval: Duration,
    last_sweep: StdMutex<Instant>,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_turns: usize, sweep_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            retired: StdMutex::new(RetiredIds::default()),
            ttl,
            max_turns: max_turns.max(1),
            sweep_interval,
            last_sweep: StdMutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.session_ttl(),
            config.max_turns_per_session,
            config.session_sweep_interval(),
        )
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &str) -> Result<Option<SessionSlot>, AppError> {
        let map = self
            .sessions
            .read()
            .map_err(|_| AppError::Internal("Session map lock poisoned".to_string()))?;
        Ok(map.get(id).cloned())
    }

    fn is_stale(&self, session: &Session, now: DateTime<Utc>) -> bool {
        (now - session.last_activity)
            .to_std()
            .map(|idle| idle > self.ttl)
            .unwrap_or(false)
    }

    /// Whether a session known from elsewhere may continue under its id.
    fn can_reopen(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.is_active() && !self.is_stale(session, now) && (session.turn_count as usize) < self.max_turns
    }

    /// True when `id` belonged to a session that ended and was evicted.
    pub fn is_retired(&self, id: &str) -> bool {
        self.retired.lock().map(|retired| retired.contains(id)).unwrap_or(false)
    }

    fn retire(&self, id: &str) {
        if let Ok(mut retired) = self.retired.lock() {
            retired.insert(id);
        }
    }

    /// Returns a live session for `session_id`, creating one when needed.
    ///
    /// Unknown ids are adopted as-is. Expired, closed or retired sessions are
    /// replaced by a session with a freshly generated id. The flag is true
    /// when the returned session was created by this call.
    pub async fn resolve(&self, session_id: Option<&str>) -> Result<(Session, bool), AppError> {
        self.resolve_with(session_id, |_| async { None }).await
    }

    /// Like [`SessionStore::resolve`], but asks `prior` what is known about an
    /// id before adopting it.
    ///
    /// `prior` runs while the new slot is already locked, so concurrent
    /// callers for the same id wait until its turn counter is seeded. A prior
    /// session that is closed, idle past the TTL or full is not reopened: the
    /// id is retired and a fresh session is created instead.
    pub async fn resolve_with<F, Fut>(&self, session_id: Option<&str>, prior: F) -> Result<(Session, bool), AppError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Option<Session>>,
    {
        self.maybe_sweep();

        let requested = session_id.map(str::trim).filter(|id| !id.is_empty());
        let mut prior = Some(prior);
        match requested {
            Some(id) if self.is_retired(id) => {
                debug!("Session {} was retired, starting a new one", id);
            }
            Some(id) => loop {
                match self.slot(id)? {
                    Some(slot) => {
                        let mut session = slot.lock().await;
                        let now = Utc::now();
                        if session.is_active() && self.is_stale(&session, now) {
                            session.status = SessionStatus::Expired;
                            info!("Session {} expired", id);
                        }
                        if session.is_active() {
                            session.last_activity = now;
                            return Ok((session.clone(), false));
                        }
                        debug!("Session {} is {}, starting a new one", id, session.status);
                        break;
                    }
                    None => {
                        // Another task adopted the same id first; use its session.
                        let Some(mut session) = self.insert_locked(id)? else {
                            continue;
                        };
                        let known = match prior.take() {
                            Some(load) => load(id.to_string()).await,
                            None => None,
                        };
                        match known {
                            Some(previous) if !self.can_reopen(&previous, Utc::now()) => {
                                info!(
                                    "Session {} is {} with {} turns in storage, starting a new one",
                                    id, previous.status, previous.turn_count
                                );
                                session.status = SessionStatus::Expired;
                                drop(session);
                                self.retire(id);
                                self.evict(id);
                                break;
                            }
                            Some(previous) => {
                                session.turn_count = previous.turn_count;
                                session.created_at = previous.created_at;
                                session.metadata = previous.metadata;
                                if previous.turn_count > 0 {
                                    debug!("Session {} resumes after turn {}", id, previous.turn_count);
                                }
                                return Ok((session.clone(), true));
                            }
                            None => return Ok((session.clone(), true)),
                        }
                    }
                }
            },
            None => {}
        }

        let id = Uuid::new_v4().to_string();
        self.insert_locked(&id)?
            .map(|session| (session.clone(), true))
            .ok_or_else(|| AppError::Internal(format!("Generated session id {} already in use", id)))
    }

    /// Publishes a new slot for `id` and returns it locked, or `None` when
    /// the id is already taken.
    fn insert_locked(&self, id: &str) -> Result<Option<OwnedMutexGuard<Session>>, AppError> {
        let mut map = self
            .sessions
            .write()
            .map_err(|_| AppError::Internal("Session map lock poisoned".to_string()))?;
        if map.contains_key(id) {
            return Ok(None);
        }

        let slot = Arc::new(Mutex::new(Session::new(id)));
        let guard = slot
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::Internal(format!("New session slot {} already locked", id)))?;
        map.insert(id.to_string(), slot);
        info!("Created session {}", id);
        Ok(Some(guard))
    }

    fn evict(&self, id: &str) {
        if let Ok(mut map) = self.sessions.write() {
            map.remove(id);
        }
    }

    /// Appends a turn summary and stamps it with the next turn number.
    ///
    /// Fails with `SessionExpired` when the TTL elapsed since the last
    /// activity and with `SessionFull` once the turn limit is reached; both
    /// leave the session in a terminal state.
    pub async fn mutate(&self, session_id: &str, mut summary: TurnSummary) -> Result<Session, AppError> {
        let slot = self
            .slot(session_id)?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;
        let mut session = slot.lock().await;
        let now = Utc::now();

        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Closed if session.turn_count as usize >= self.max_turns => {
                return Err(AppError::SessionFull {
                    session_id: session_id.to_string(),
                    max_turns: self.max_turns,
                });
            }
            _ => return Err(AppError::SessionExpired(session_id.to_string())),
        }

        if self.is_stale(&session, now) {
            session.status = SessionStatus::Expired;
            return Err(AppError::SessionExpired(session_id.to_string()));
        }

        if session.turn_count as usize >= self.max_turns {
            session.status = SessionStatus::Closed;
            session.metadata.set(MetadataKey::EndReason, "max_turns");
            info!("Session {} reached {} turns, closing", session_id, self.max_turns);
            return Err(AppError::SessionFull {
                session_id: session_id.to_string(),
                max_turns: self.max_turns,
            });
        }

        session.turn_count += 1;
        summary.turn_number = session.turn_count;
        summary.at = now;
        session.turns.push(summary);
        if session.turns.len() > self.max_turns {
            let excess = session.turns.len() - self.max_turns;
            session.turns.drain(..excess);
        }
        session.last_activity = now;

        Ok(session.clone())
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let slot = self.slot(session_id).ok().flatten()?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    /// The session when it is active and within its TTL. Does not touch it.
    pub async fn live(&self, session_id: &str) -> Option<Session> {
        let session = self.get(session_id).await?;
        (session.is_active() && !self.is_stale(&session, Utc::now())).then_some(session)
    }

    /// Closes the session and records why.
    pub async fn close(&self, session_id: &str, reason: &str) -> Result<Session, AppError> {
        let slot = self
            .slot(session_id)?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;
        let mut session = slot.lock().await;
        session.status = SessionStatus::Closed;
        session.metadata.set(MetadataKey::EndReason, reason);
        session.last_activity = Utc::now();
        info!("Session {} closed: {}", session_id, reason);
        Ok(session.clone())
    }

    /// Flags the session for hand-over to a human agent. Returns the transfer id.
    pub async fn request_transfer(&self, session_id: &str, reason: &str) -> Result<(Session, String), AppError> {
        let slot = self
            .slot(session_id)?
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;
        let mut session = slot.lock().await;

        let transfer_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let now = Utc::now();
        session.metadata.set(MetadataKey::TransferRequested, "true");
        session.metadata.set(MetadataKey::TransferId, transfer_id.clone());
        session.metadata.set(MetadataKey::TransferReason, reason);
        session.metadata.set(MetadataKey::TransferTime, now.to_rfc3339());
        session.last_activity = now;
        info!("Transfer {} requested for session {}", transfer_id, session_id);
        Ok((session.clone(), transfer_id))
    }

    pub async fn stats(&self, session_id: &str) -> Result<SessionStats, AppError> {
        let session = self
            .get(session_id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        let mut intents_used: Vec<String> = Vec::new();
        for turn in &session.turns {
            if !intents_used.contains(&turn.intent) {
                intents_used.push(turn.intent.clone());
            }
        }
        let avg_confidence = if session.turns.is_empty() {
            0.0
        } else {
            session.turns.iter().map(|t| t.confidence).sum::<f32>() / session.turns.len() as f32
        };

        Ok(SessionStats {
            session_id: session.id,
            status: session.status,
            created_at: session.created_at,
            last_activity: session.last_activity,
            total_turns: session.turn_count,
            intents_used,
            avg_confidence,
        })
    }

    fn maybe_sweep(&self) {
        let due = match self.last_sweep.lock() {
            Ok(mut last) if last.elapsed() >= self.sweep_interval => {
                *last = Instant::now();
                true
            }
            _ => false,
        };
        if due {
            self.sweep_expired();
        }
    }

    /// Marks idle sessions expired and evicts every non-active one, retiring
    /// their ids. Sessions busy with a turn are left alone. Returns the
    /// number evicted.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let slots: Vec<(String, SessionSlot)> = match self.sessions.read() {
            Ok(map) => map.iter().map(|(id, slot)| (id.clone(), slot.clone())).collect(),
            Err(_) => return 0,
        };

        let mut evict = Vec::new();
        for (id, slot) in slots {
            let Ok(mut session) = slot.try_lock() else {
                continue;
            };
            if session.is_active() && self.is_stale(&session, now) {
                session.status = SessionStatus::Expired;
            }
            if !session.is_active() {
                evict.push(id);
            }
        }

        if evict.is_empty() {
            return 0;
        }
        // Retire first so a concurrent resolve never adopts a half-evicted id.
        for id in &evict {
            self.retire(id);
        }
        let Ok(mut map) = self.sessions.write() else {
            return 0;
        };
        for id in &evict {
            map.remove(id);
        }
        info!("Swept {} inactive sessions", evict.len());
        evict.len()
    }
}
