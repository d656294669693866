use serde::{Deserialize, Serialize};

use super::PromptMessage;

/// Everything the completion service needs for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: f32,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// The newest human message, which is the one being answered.
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::MessageRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Structured reply of a non-streamed completion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CompletionReply {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub model: Option<String>,
}

impl CompletionReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            finish_reason: Some("stop".to_string()),
            model: None,
        }
    }
}

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionChunk {
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
}

impl CompletionChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            finish_reason: None,
        }
    }
}

/// Unwraps a structured reply into plain text. Missing content becomes `""`.
pub fn extract_text(reply: CompletionReply) -> String {
    reply.content.unwrap_or_default()
}

/// Plain text carried by a streamed chunk, if any.
pub fn extract_delta(chunk: CompletionChunk) -> Option<String> {
    chunk.delta.filter(|d| !d.is_empty())
}
