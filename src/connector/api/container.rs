use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::application::{
    CompletionService, ManageSessionsUseCase, RespondUseCase, SendMessageUseCase,
    SessionRepository, DEFAULT_TURN_TIMEOUT,
};
use crate::connector::adapter::DEFAULT_BASE_URL;
use crate::domain::{ContextMode, DomainError, PipelineConfig, PromptTemplate};
use crate::{InMemorySessionRepository, MockCompletion, OpenAiCompletionClient};

use super::view::ChatView;

pub const DEFAULT_TITLE: &str = "OpenAI GPT-4o Chatbot";
const MOCK_API_KEY: &str = "mock-key";

pub struct ContainerConfig {
    /// Credential read from `OPENAI_API_KEY`. `None` or blank is a
    /// configuration error unless `mock_llm` is set.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub stream: bool,
    pub turn_timeout: Duration,
    pub context_mode: ContextMode,
    pub mock_llm: bool,
    pub title: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: crate::domain::DEFAULT_MODEL.to_string(),
            temperature: crate::domain::DEFAULT_TEMPERATURE,
            stream: true,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            context_mode: ContextMode::default(),
            mock_llm: false,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

pub struct Container {
    pipeline: PipelineConfig,
    completion_service: Arc<dyn CompletionService>,
    session_repo: Arc<dyn SessionRepository>,
    respond_use_case: Arc<RespondUseCase>,
    view: ChatView,
    config: ContainerConfig,
}

impl Container {
    /// Validate configuration and wire every service. Fails before anything is
    /// served when the credential is missing.
    pub fn new(config: ContainerConfig) -> Result<Self, DomainError> {
        let pipeline = Self::pipeline_config(&config)?;

        let completion_service: Arc<dyn CompletionService> = if config.mock_llm {
            debug!("Using mock completion service");
            Arc::new(MockCompletion::new())
        } else {
            debug!("Using OpenAI completion service at {}", config.base_url);
            Arc::new(OpenAiCompletionClient::from_config(&pipeline, &config.base_url))
        };

        Self::with_completion_service(config, pipeline, completion_service)
    }

    /// Wire the container around an already built completion service.
    pub fn with_completion_service(
        config: ContainerConfig,
        pipeline: PipelineConfig,
        completion_service: Arc<dyn CompletionService>,
    ) -> Result<Self, DomainError> {
        let template = PromptTemplate::default().with_context_mode(config.context_mode);
        let respond_use_case = Arc::new(
            RespondUseCase::new(Arc::clone(&completion_service), &pipeline).with_template(template),
        );
        let session_repo: Arc<dyn SessionRepository> = Arc::new(InMemorySessionRepository::new());
        let view = ChatView::new()?;

        debug!(
            "Container ready: model={} stream={} context={:?}",
            pipeline.model_id(),
            pipeline.stream(),
            config.context_mode
        );

        Ok(Self {
            pipeline,
            completion_service,
            session_repo,
            respond_use_case,
            view,
            config,
        })
    }

    fn pipeline_config(config: &ContainerConfig) -> Result<PipelineConfig, DomainError> {
        let api_key = match (config.api_key.as_deref(), config.mock_llm) {
            (Some(key), _) if !key.trim().is_empty() => key.to_string(),
            (_, true) => MOCK_API_KEY.to_string(),
            _ => {
                return Err(DomainError::config(format!(
                    "{} is not set",
                    crate::domain::API_KEY_VAR
                )))
            }
        };

        Ok(PipelineConfig::new(api_key, &config.model)?
            .with_temperature(config.temperature)?
            .with_stream(config.stream))
    }

    pub fn send_message_use_case(&self) -> SendMessageUseCase {
        SendMessageUseCase::new(Arc::clone(&self.respond_use_case))
            .with_timeout(self.config.turn_timeout)
    }

    pub fn sessions_use_case(&self) -> ManageSessionsUseCase {
        ManageSessionsUseCase::new(Arc::clone(&self.session_repo))
    }

    pub fn view(&self) -> &ChatView {
        &self.view
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn completion_model(&self) -> &str {
        self.completion_service.model_name()
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }

    pub fn streaming(&self) -> bool {
        self.pipeline.stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_config_error() {
        let err = Container::new(ContainerConfig::default()).err().unwrap();
        assert!(err.is_config_error());
    }

    #[test]
    fn blank_key_is_config_error() {
        let config = ContainerConfig {
            api_key: Some("   ".to_string()),
            ..ContainerConfig::default()
        };
        assert!(Container::new(config).err().unwrap().is_config_error());
    }

    #[test]
    fn mock_mode_needs_no_key() {
        let config = ContainerConfig {
            mock_llm: true,
            ..ContainerConfig::default()
        };
        let container = Container::new(config).unwrap();
        assert_eq!(container.completion_model(), "mock-completion");
        assert_eq!(container.pipeline().model_id(), "gpt-4o");
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let config = ContainerConfig {
            mock_llm: true,
            temperature: 3.5,
            ..ContainerConfig::default()
        };
        assert!(Container::new(config).err().unwrap().is_config_error());
    }
}
