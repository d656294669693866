use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use crate::application::CompletionService;
use crate::domain::{
    extract_delta, extract_text, ChatTurn, CompletionRequest, DomainError, PipelineConfig,
    PromptTemplate,
};

/// Plain-text pieces of a streamed reply, in delivery order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, DomainError>> + Send>>;

/// The three-stage chat pipeline: prompt template, completion call, text extraction.
///
/// Errors from the completion service are passed through untouched; retrying
/// or reporting them is up to the caller.
pub struct RespondUseCase {
    completion_service: Arc<dyn CompletionService>,
    template: PromptTemplate,
    model: String,
    temperature: f32,
    streaming: bool,
}

impl RespondUseCase {
    pub fn new(completion_service: Arc<dyn CompletionService>, config: &PipelineConfig) -> Self {
        Self {
            completion_service,
            template: PromptTemplate::default(),
            model: config.model_id().to_string(),
            temperature: config.temperature(),
            streaming: config.stream(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Stage one: render the prompt and wrap it with the model settings.
    pub fn build_request(&self, history: Option<&[ChatTurn]>, user_text: &str) -> CompletionRequest {
        let prompt = self.template.render(history, user_text);
        CompletionRequest::new(&self.model, prompt.into_messages())
            .with_temperature(self.temperature)
    }

    pub async fn respond(
        &self,
        history: Option<&[ChatTurn]>,
        user_text: &str,
    ) -> Result<String, DomainError> {
        let request = self.build_request(history, user_text).with_stream(false);
        debug!(
            "Submitting {} messages to {}",
            request.messages.len(),
            self.completion_service.model_name()
        );

        let start_time = Instant::now();
        let reply = self.completion_service.complete(&request).await?;
        let text = extract_text(reply);

        info!(
            "Completion returned {} chars in {:.2}s",
            text.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(text)
    }

    pub async fn respond_stream(
        &self,
        history: Option<&[ChatTurn]>,
        user_text: &str,
    ) -> Result<TextStream, DomainError> {
        let request = self.build_request(history, user_text).with_stream(true);
        debug!(
            "Streaming {} messages from {}",
            request.messages.len(),
            self.completion_service.model_name()
        );

        let chunks = self.completion_service.stream(&request).await?;
        let text = chunks.filter_map(|item| async move {
            match item {
                Ok(chunk) => extract_delta(chunk).map(Ok),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MockCompletion;
    use crate::domain::{ContextMode, MessageRole, DEFAULT_MODEL};

    fn config() -> PipelineConfig {
        PipelineConfig::new("sk-test", DEFAULT_MODEL).unwrap()
    }

    #[tokio::test]
    async fn respond_returns_extracted_text() {
        let mock = Arc::new(MockCompletion::new().with_reply("What is the capital of France?", "Paris"));
        let use_case = RespondUseCase::new(mock.clone(), &config());

        let text = use_case
            .respond(None, "What is the capital of France?")
            .await
            .unwrap();
        assert_eq!(text, "Paris");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o");
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].messages[0].role, MessageRole::System);
        assert_eq!(requests[0].messages[0].content, "You are a helpful assistant.");
    }

    #[tokio::test]
    async fn stateless_requests_never_include_earlier_turns() {
        let mock = Arc::new(MockCompletion::new());
        let use_case = RespondUseCase::new(mock.clone(), &config());

        let history = vec![ChatTurn::user("A"), ChatTurn::assistant("echo: A")];
        use_case.respond(Some(&history), "B").await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].messages.len(), 2);
        assert!(requests[0].messages.iter().all(|m| !m.content.contains('A')));
    }

    #[tokio::test]
    async fn full_history_mode_threads_context() {
        let mock = Arc::new(MockCompletion::new());
        let use_case = RespondUseCase::new(mock.clone(), &config())
            .with_template(PromptTemplate::default().with_context_mode(ContextMode::FullHistory));

        let history = vec![ChatTurn::user("A"), ChatTurn::assistant("echo: A")];
        use_case.respond(Some(&history), "B").await.unwrap();

        assert_eq!(mock.requests()[0].messages.len(), 4);
    }

    #[tokio::test]
    async fn errors_propagate_unchanged() {
        let mock = Arc::new(MockCompletion::new().failing_with(|| DomainError::service(500, "boom")));
        let use_case = RespondUseCase::new(mock, &config());

        let err = use_case.respond(None, "hi").await.unwrap_err();
        assert!(matches!(err, DomainError::ServiceError { status: 500, .. }));
    }

    #[tokio::test]
    async fn stream_concatenates_to_full_reply() {
        let mock = Arc::new(MockCompletion::new().with_reply("hi", "Hello there friend"));
        let use_case = RespondUseCase::new(mock.clone(), &config());

        let pieces: Vec<String> = use_case
            .respond_stream(None, "hi")
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert!(pieces.len() > 1);
        assert_eq!(pieces.concat(), "Hello there friend");
        assert!(mock.requests()[0].stream);
    }
}
