use serde::{Deserialize, Serialize};

use super::{ChatTurn, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Speaker of a message sent to the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

impl From<&ChatTurn> for PromptMessage {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role().into(),
            content: turn.content().to_string(),
        }
    }
}

/// A rendered, conversation-shaped prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatPrompt {
    messages: Vec<PromptMessage>,
}

impl ChatPrompt {
    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<PromptMessage> {
        self.messages
    }
}

/// How much of the conversation is sent along with the newest message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// Only the system instruction and the newest human message.
    #[default]
    SingleTurn,
    /// Prior turns are replayed between the system instruction and the newest message.
    FullHistory,
}

/// Fixed system instruction followed by one human turn.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
    context_mode: ContextMode,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            context_mode: ContextMode::default(),
        }
    }

    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = mode;
        self
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn context_mode(&self) -> ContextMode {
        self.context_mode
    }

    /// Render the prompt for `user_text`. `history` holds the turns that
    /// precede it and is ignored in [`ContextMode::SingleTurn`].
    pub fn render(&self, history: Option<&[ChatTurn]>, user_text: &str) -> ChatPrompt {
        let mut messages = vec![PromptMessage::system(&self.system)];

        if self.context_mode == ContextMode::FullHistory {
            if let Some(turns) = history {
                messages.extend(turns.iter().map(PromptMessage::from));
            }
        }

        messages.push(PromptMessage::user(user_text));
        ChatPrompt { messages }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}
