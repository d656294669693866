use serde::Serialize;

use crate::domain::{ChatTurn, DomainError, SessionId};

use super::super::Container;

#[derive(Debug, Serialize)]
pub struct HistoryView {
    pub session_id: String,
    pub state: &'static str,
    pub turns: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub status: &'static str,
    pub model: String,
    pub sessions: u64,
}

pub struct SessionController<'a> {
    container: &'a Container,
}

impl<'a> SessionController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn history(&self, id: &SessionId) -> Result<HistoryView, DomainError> {
        let session = self.container.sessions_use_case().get(id).await?;
        Ok(HistoryView {
            session_id: session.id().to_string(),
            state: session.state().as_str(),
            turns: session.all(),
        })
    }

    /// Returns whether a turn was actually in flight.
    pub async fn cancel(&self, id: &SessionId) -> Result<bool, DomainError> {
        self.container.sessions_use_case().cancel(id).await
    }

    pub async fn end(&self, id: &SessionId) -> Result<(), DomainError> {
        self.container.sessions_use_case().end(id).await
    }

    pub async fn health(&self) -> Result<HealthView, DomainError> {
        let sessions = self.container.sessions_use_case().count().await?;
        Ok(HealthView {
            status: "ok",
            model: self.container.completion_model().to_string(),
            sessions,
        })
    }
}
