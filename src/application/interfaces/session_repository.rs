use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DomainError, Session, SessionId};

/// Owner of the live sessions. Each session holds its own history; nothing is
/// shared between sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Start a new, empty session.
    async fn create(&self) -> Result<Arc<Session>, DomainError>;

    async fn find(&self, id: &SessionId) -> Result<Option<Arc<Session>>, DomainError>;

    async fn remove(&self, id: &SessionId) -> Result<(), DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;

    /// Drop idle sessions that have not been touched for `older_than`.
    /// Sessions with a turn in flight are kept. Returns how many were removed.
    async fn remove_idle(&self, older_than: Duration) -> Result<u64, DomainError>;
}
