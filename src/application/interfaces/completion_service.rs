use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::domain::{CompletionChunk, CompletionReply, CompletionRequest, DomainError};

/// Finite, single-use sequence of streamed pieces. The stream ends once the
/// service signals the end of the response.
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionChunk, DomainError>> + Send>>;

/// An interface for submitting chat-style prompts to a remote text-completion
/// service.
///
/// Implementors encapsulate transport, authentication, and vendor-specific
/// wire formats so the pipeline stays decoupled from any particular provider.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Submit the request and wait for the whole structured reply.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, DomainError>;

    /// Submit the request and receive the reply incrementally.
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, DomainError>;

    fn model_name(&self) -> &str;
}
