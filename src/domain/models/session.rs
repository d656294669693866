use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::DomainError;

use super::{ChatHistory, ChatTurn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable state of the per-session chat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Processing,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Processing => "processing",
        }
    }
}

struct InFlight {
    seq: u64,
    token: CancellationToken,
}

struct SessionState {
    history: ChatHistory,
    in_flight: Option<InFlight>,
    turns_started: u64,
    last_active: Instant,
}

/// One browser-connected conversation: its history plus the turn state machine.
///
/// Handlers receive an `Arc<Session>` explicitly; nothing about a conversation
/// lives in process-wide state. All operations are short in-memory mutations,
/// so a blocking mutex is held only for the duration of each call.
pub struct Session {
    id: SessionId,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState {
                history: ChatHistory::new(),
                in_flight: None,
                turns_started: 0,
                last_active: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn append(&self, turn: ChatTurn) {
        let mut state = self.lock();
        state.history.append(turn);
        state.last_active = Instant::now();
    }

    /// Snapshot of the conversation, oldest first.
    pub fn all(&self) -> Vec<ChatTurn> {
        self.lock().history.all().to_vec()
    }

    pub fn history(&self) -> ChatHistory {
        self.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> TurnState {
        if self.lock().in_flight.is_some() {
            TurnState::Processing
        } else {
            TurnState::Idle
        }
    }

    /// Moves the session from `Idle` to `Processing`.
    ///
    /// Only one turn may be in flight per session; the returned guard moves the
    /// session back to `Idle` when dropped, whether the turn finished or failed.
    pub fn begin_turn(self: &Arc<Self>) -> Result<TurnGuard, DomainError> {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return Err(DomainError::busy(format!(
                "session {} already has a turn in flight",
                self.id
            )));
        }

        state.turns_started += 1;
        let seq = state.turns_started;
        let token = CancellationToken::new();
        state.in_flight = Some(InFlight {
            seq,
            token: token.clone(),
        });
        state.last_active = Instant::now();

        Ok(TurnGuard {
            session: Arc::clone(self),
            seq,
            token,
        })
    }

    /// Cancels the in-flight turn, if any. Returns whether a turn was cancelled.
    pub fn cancel_turn(&self) -> bool {
        match self.lock().in_flight.as_ref() {
            Some(in_flight) => {
                in_flight.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Marks the session as in use without changing it.
    pub fn touch(&self) {
        self.lock().last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.lock().last_active.elapsed()
    }

    fn finish_turn(&self, seq: u64) {
        let mut state = self.lock();
        // A guard only clears the slot it installed.
        if state.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            state.in_flight = None;
        }
        state.last_active = Instant::now();
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("turns", &self.len())
            .field("state", &self.state())
            .finish()
    }
}

/// Held for the duration of one turn. Dropping it returns the session to `Idle`.
pub struct TurnGuard {
    session: Arc<Session>,
    seq: u64,
    token: CancellationToken,
}

impl TurnGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.session.finish_turn(self.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        Arc::new(Session::new(SessionId::generate()))
    }

    #[test]
    fn starts_idle_and_empty() {
        let session = session();
        assert_eq!(session.state(), TurnState::Idle);
        assert!(session.is_empty());
    }

    #[test]
    fn all_is_restartable() {
        let session = session();
        session.append(ChatTurn::user("hello"));
        session.append(ChatTurn::assistant("hi there"));

        let first = session.all();
        let second = session.all();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn only_one_turn_in_flight() {
        let session = session();
        let guard = session.begin_turn().expect("first turn starts");
        assert_eq!(session.state(), TurnState::Processing);

        let second = session.begin_turn();
        assert!(matches!(second, Err(DomainError::Busy(_))));

        drop(guard);
        assert_eq!(session.state(), TurnState::Idle);
        assert!(session.begin_turn().is_ok());
    }

    #[test]
    fn cancel_reaches_the_in_flight_token() {
        let session = session();
        assert!(!session.cancel_turn());

        let guard = session.begin_turn().unwrap();
        assert!(session.cancel_turn());
        assert!(guard.token().is_cancelled());
    }

    #[test]
    fn each_turn_gets_a_fresh_token() {
        let session = session();
        let first = session.begin_turn().unwrap();
        session.cancel_turn();
        drop(first);

        let second = session.begin_turn().unwrap();
        assert!(!second.token().is_cancelled());
    }
}
