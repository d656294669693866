use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;

use crate::application::ReplyEvent;
use crate::domain::Session;

use super::super::Container;

/// One-shot question from the command line.
pub struct AskController<'a> {
    container: &'a Container,
}

impl<'a> AskController<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self { container }
    }

    /// Run a single turn in a throwaway session, writing the reply to `out`
    /// as it arrives.
    pub async fn ask<W: Write>(&self, question: &str, out: &mut W) -> Result<()> {
        let sessions = self.container.sessions_use_case();
        let session = sessions.start().await?;

        let result = self.run(&session, question, out).await;

        sessions.end(session.id()).await?;
        result
    }

    async fn run<W: Write>(&self, session: &Arc<Session>, question: &str, out: &mut W) -> Result<()> {
        let mut events = self
            .container
            .send_message_use_case()
            .stream(session, question)
            .await?;

        while let Some(event) = events.next().await {
            match event? {
                ReplyEvent::Delta(text) => {
                    out.write_all(text.as_bytes())?;
                    out.flush()?;
                }
                ReplyEvent::Done(_) => writeln!(out)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::api::ContainerConfig;

    #[tokio::test]
    async fn ask_prints_reply_and_forgets_session() {
        let container = Container::new(ContainerConfig {
            mock_llm: true,
            ..ContainerConfig::default()
        })
        .unwrap();
        let mut out = Vec::new();

        AskController::new(&container)
            .ask("hello there", &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "echo: hello there\n");
        assert_eq!(container.sessions_use_case().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let container = Container::new(ContainerConfig {
            mock_llm: true,
            ..ContainerConfig::default()
        })
        .unwrap();

        let err = AskController::new(&container)
            .ask("   ", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
