pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use application::{
    CompletionService, ManageSessionsUseCase, ReplyEvent, RespondUseCase, SendMessageUseCase,
    SessionRepository,
};

pub use cli::Commands;

pub use connector::{InMemorySessionRepository, MockCompletion, OpenAiCompletionClient};

pub use domain::{
    ChatHistory, ChatTurn, CompletionReply, CompletionRequest, ContextMode, DomainError,
    PipelineConfig, PromptTemplate, Role, Session, SessionId,
};
