use crate::application::ReplyStream;
use crate::domain::{ChatTurn, DomainError, SessionId};

use super::super::Container;

pub struct MessageController<'a> {
    container: &'a Container,
}

impl<'a> MessageController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    /// Run one turn to completion and return the assistant turn.
    pub async fn send(&self, id: &SessionId, content: &str) -> Result<ChatTurn, DomainError> {
        let session = self.container.sessions_use_case().get(id).await?;
        self.container
            .send_message_use_case()
            .send(&session, content)
            .await
    }

    pub async fn stream(&self, id: &SessionId, content: &str) -> Result<ReplyStream, DomainError> {
        let session = self.container.sessions_use_case().get(id).await?;
        self.container
            .send_message_use_case()
            .stream(&session, content)
            .await
    }
}
