use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::debug;

use crate::application::{CompletionService, CompletionStream};
use crate::domain::{CompletionChunk, CompletionReply, CompletionRequest, DomainError};

type ErrorFactory = Arc<dyn Fn() -> DomainError + Send + Sync>;

/// Scripted completion service for offline runs (`--mock-llm`) and tests.
///
/// Replies are looked up by the newest human message; anything unscripted is
/// answered with `echo: <message>`. Every request is recorded.
pub struct MockCompletion {
    replies: HashMap<String, String>,
    always_fail: Option<ErrorFactory>,
    queued_failures: Mutex<VecDeque<DomainError>>,
    stream_failure: Option<(usize, ErrorFactory)>,
    stream_stall: Option<usize>,
    hang: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            always_fail: None,
            queued_failures: Mutex::new(VecDeque::new()),
            stream_failure: None,
            stream_stall: None,
            hang: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, user_text: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies.insert(user_text.into(), reply.into());
        self
    }

    /// Every call fails with the produced error.
    pub fn failing_with<F>(mut self, error: F) -> Self
    where
        F: Fn() -> DomainError + Send + Sync + 'static,
    {
        self.always_fail = Some(Arc::new(error));
        self
    }

    /// The next call fails with `error`; later calls succeed again.
    pub fn fail_next(self, error: DomainError) -> Self {
        self.queue().push_back(error);
        self
    }

    /// Streams deliver `after` pieces and then fail.
    pub fn fail_stream_after<F>(mut self, after: usize, error: F) -> Self
    where
        F: Fn() -> DomainError + Send + Sync + 'static,
    {
        self.stream_failure = Some((after, Arc::new(error)));
        self
    }

    /// Streams deliver `after` pieces and then go quiet without ending.
    pub fn stall_stream_after(mut self, after: usize) -> Self {
        self.stream_stall = Some(after);
        self
    }

    /// Calls never return, like a remote service that stopped responding.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<DomainError>> {
        self.queued_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reply_for(&self, request: &CompletionRequest) -> String {
        let user_text = request.user_text().unwrap_or_default();
        self.replies
            .get(user_text)
            .cloned()
            .unwrap_or_else(|| format!("echo: {user_text}"))
    }

    /// Records the request and applies the scripted latency and failures.
    async fn begin(&self, request: &CompletionRequest) -> Result<(), DomainError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.queue().pop_front() {
            return Err(error);
        }
        if let Some(error) = &self.always_fail {
            return Err(error());
        }
        Ok(())
    }
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, DomainError> {
        self.begin(request).await?;
        let reply = self.reply_for(request);
        debug!("Mock completion replying with {} chars", reply.len());

        Ok(CompletionReply {
            content: Some(reply),
            finish_reason: Some("stop".to_string()),
            model: Some(request.model.clone()),
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, DomainError> {
        self.begin(request).await?;
        let reply = self.reply_for(request);

        let mut items: Vec<Result<CompletionChunk, DomainError>> = reply
            .split_inclusive(' ')
            .map(|piece| Ok(CompletionChunk::delta(piece)))
            .collect();

        if let Some(after) = self.stream_stall {
            items.truncate(after);
            return Ok(Box::pin(stream::iter(items).chain(stream::pending())));
        }

        if let Some((after, error)) = &self.stream_failure {
            items.truncate(*after);
            items.push(Err(error()));
        } else {
            items.push(Ok(CompletionChunk {
                delta: None,
                finish_reason: Some("stop".to_string()),
            }));
        }

        Ok(Box::pin(stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        "mock-completion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PromptMessage;
    use std::time::Duration;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new("gpt-4o", vec![PromptMessage::user(text)])
    }

    #[tokio::test]
    async fn unscripted_input_is_echoed() {
        let mock = MockCompletion::new();
        let reply = mock.complete(&request("ping")).await.unwrap();
        assert_eq!(reply.content.as_deref(), Some("echo: ping"));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn queued_failure_applies_once() {
        let mock = MockCompletion::new().fail_next(DomainError::rate_limit("slow down"));

        assert!(mock.complete(&request("a")).await.is_err());
        assert!(mock.complete(&request("b")).await.is_ok());
    }

    #[tokio::test]
    async fn stream_splits_on_spaces() {
        let mock = MockCompletion::new().with_reply("q", "one two three");
        let chunks: Vec<CompletionChunk> = mock
            .stream(&request("q"))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let text: String = chunks.iter().filter_map(|c| c.delta.clone()).collect();
        assert_eq!(text, "one two three");
        assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn stalled_stream_stays_open() {
        let mock = MockCompletion::new()
            .with_reply("q", "one two three")
            .stall_stream_after(1);
        let mut chunks = mock.stream(&request("q")).await.unwrap();

        let first = chunks.next().await.unwrap().unwrap();
        assert_eq!(first.delta.as_deref(), Some("one "));
        let next = tokio::time::timeout(Duration::from_millis(20), chunks.next()).await;
        assert!(next.is_err());
    }
}
