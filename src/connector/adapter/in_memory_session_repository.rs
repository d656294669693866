use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::SessionRepository;
use crate::domain::{DomainError, Session, SessionId, TurnState};

pub struct InMemorySessionRepository {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<Session>>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self) -> Result<Arc<Session>, DomainError> {
        let session = Arc::new(Session::new(SessionId::generate()));
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.id().clone(), Arc::clone(&session));

        debug!("Created session {} ({} live)", session.id(), sessions.len());
        Ok(session)
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Arc<Session>>, DomainError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(id).cloned())
    }

    async fn remove(&self, id: &SessionId) -> Result<(), DomainError> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(id);
        Ok(())
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.len() as u64)
    }

    async fn remove_idle(&self, older_than: Duration) -> Result<u64, DomainError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();

        sessions.retain(|_, session| {
            session.state() == TurnState::Processing || session.idle_for() < older_than
        });

        let removed = (before - sessions.len()) as u64;
        if removed > 0 {
            debug!("Evicted {} idle sessions ({} live)", removed, sessions.len());
        }
        Ok(removed)
    }
}
