use std::sync::Arc;

use crate::domain::{DomainError, Session, SessionId};

use super::super::view::PageOptions;
use super::super::Container;

/// Session pages: creating a chat and replaying it.
pub struct ChatController<'a> {
    container: &'a Container,
}

impl<'a> ChatController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    pub async fn start(&self) -> Result<Arc<Session>, DomainError> {
        self.container.sessions_use_case().start().await
    }

    pub async fn open(&self, id: &SessionId) -> Result<Arc<Session>, DomainError> {
        self.container.sessions_use_case().get(id).await
    }

    pub fn page(&self, session: &Session) -> Result<String, DomainError> {
        self.render(session, None, None)
    }

    /// The page after a failed turn: the banner explains the failure and the
    /// input box gets the message back.
    pub fn page_with_error(
        &self,
        session: &Session,
        error: &str,
        draft: &str,
    ) -> Result<String, DomainError> {
        self.render(session, Some(error), Some(draft))
    }

    fn render(
        &self,
        session: &Session,
        error: Option<&str>,
        draft: Option<&str>,
    ) -> Result<String, DomainError> {
        self.container.view().render(
            session,
            PageOptions {
                title: self.container.title(),
                model: self.container.pipeline().model_id(),
                streaming: self.container.streaming(),
                error,
                draft,
            },
        )
    }
}
