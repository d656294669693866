use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::application::SessionRepository;
use crate::domain::{ChatTurn, DomainError, Session, SessionId};

pub struct ManageSessionsUseCase {
    session_repo: Arc<dyn SessionRepository>,
}

impl ManageSessionsUseCase {
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self { session_repo }
    }

    pub async fn start(&self) -> Result<Arc<Session>, DomainError> {
        let session = self.session_repo.create().await?;
        info!(session = %session.id(), "Session started");
        Ok(session)
    }

    /// Looks up a session. Any lookup counts as activity for idle eviction.
    pub async fn get(&self, id: &SessionId) -> Result<Arc<Session>, DomainError> {
        let session = self
            .session_repo
            .find(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("session {id}")))?;
        session.touch();
        Ok(session)
    }

    pub async fn history(&self, id: &SessionId) -> Result<Vec<ChatTurn>, DomainError> {
        Ok(self.get(id).await?.all())
    }

    pub async fn cancel(&self, id: &SessionId) -> Result<bool, DomainError> {
        let cancelled = self.get(id).await?.cancel_turn();
        debug!(session = %id, cancelled, "Cancel requested");
        Ok(cancelled)
    }

    pub async fn end(&self, id: &SessionId) -> Result<(), DomainError> {
        let session = self.get(id).await?;
        session.cancel_turn();
        self.session_repo.remove(id).await?;
        info!(session = %id, "Session ended");
        Ok(())
    }

    pub async fn count(&self) -> Result<u64, DomainError> {
        self.session_repo.count().await
    }

    pub async fn sweep(&self, idle_ttl: Duration) -> Result<u64, DomainError> {
        let removed = self.session_repo.remove_idle(idle_ttl).await?;
        if removed > 0 {
            info!("Removed {} idle sessions", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::InMemorySessionRepository;

    fn use_case() -> ManageSessionsUseCase {
        ManageSessionsUseCase::new(Arc::new(InMemorySessionRepository::new()))
    }

    #[tokio::test]
    async fn sessions_have_independent_histories() {
        let use_case = use_case();
        let first = use_case.start().await.unwrap();
        let second = use_case.start().await.unwrap();

        first.append(ChatTurn::user("only in first"));

        assert_eq!(use_case.history(first.id()).await.unwrap().len(), 1);
        assert!(use_case.history(second.id()).await.unwrap().is_empty());
        assert_eq!(use_case.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let err = use_case()
            .get(&SessionId::from("missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn ending_a_session_destroys_its_history() {
        let use_case = use_case();
        let session = use_case.start().await.unwrap();
        session.append(ChatTurn::user("bye"));

        use_case.end(session.id()).await.unwrap();

        assert!(use_case.get(session.id()).await.is_err());
        assert_eq!(use_case.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reading_history_keeps_session_alive() {
        let use_case = use_case();
        let session = use_case.start().await.unwrap();
        session.append(ChatTurn::user("still here"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        use_case.history(session.id()).await.unwrap();

        assert_eq!(use_case.sweep(Duration::from_millis(50)).await.unwrap(), 0);
        assert!(use_case.get(session.id()).await.is_ok());
    }

    #[tokio::test]
    async fn untouched_session_is_swept() {
        let use_case = use_case();
        let session = use_case.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(use_case.sweep(Duration::from_millis(50)).await.unwrap(), 1);
        assert!(use_case.get(session.id()).await.unwrap_err().is_not_found());
    }
}
