use minijinja::{context, Environment, Value};
use serde::Serialize;

use crate::domain::{ChatTurn, DomainError, Session};

use super::markdown::render_markdown;

const CHAT_TEMPLATE: &str = "chat.html";
pub const INPUT_PLACEHOLDER: &str = "Ask ChatGPT anything";

/// A turn as the page shows it: the raw text plus its Markdown rendering.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedTurn {
    pub role: &'static str,
    pub content: String,
    pub html: String,
}

impl From<&ChatTurn> for RenderedTurn {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role().as_str(),
            content: turn.content().to_string(),
            html: render_markdown(turn.content()),
        }
    }
}

#[derive(Serialize)]
struct TurnView {
    role: &'static str,
    /// Already sanitized, so the template emits it without escaping.
    html: Value,
}

impl From<&ChatTurn> for TurnView {
    fn from(turn: &ChatTurn) -> Self {
        Self {
            role: turn.role().as_str(),
            html: Value::from_safe_string(render_markdown(turn.content())),
        }
    }
}

/// Options for one page render.
pub struct PageOptions<'a> {
    pub title: &'a str,
    pub model: &'a str,
    pub streaming: bool,
    pub error: Option<&'a str>,
    /// Input to put back into the text box after a failed turn.
    pub draft: Option<&'a str>,
}

/// HTML rendering of the chat page.
///
/// Templates are named `*.html`, so minijinja escapes every interpolated value
/// except turn bodies, which are sanitized Markdown output.
pub struct ChatView {
    env: Environment<'static>,
}

impl ChatView {
    pub fn new() -> Result<Self, DomainError> {
        let mut env = Environment::new();
        env.add_template(CHAT_TEMPLATE, include_str!("templates/chat.html"))
            .map_err(|e| DomainError::internal(format!("invalid chat template: {e}")))?;
        Ok(Self { env })
    }

    /// Replay the session's turns in insertion order.
    pub fn render(&self, session: &Session, options: PageOptions<'_>) -> Result<String, DomainError> {
        let turns = session.all();
        let turns: Vec<TurnView> = turns.iter().map(TurnView::from).collect();

        let template = self
            .env
            .get_template(CHAT_TEMPLATE)
            .map_err(|e| DomainError::internal(format!("missing chat template: {e}")))?;

        template
            .render(context! {
                title => options.title,
                model => options.model,
                placeholder => INPUT_PLACEHOLDER,
                session_id => session.id().as_str(),
                turns => turns,
                streaming => options.streaming,
                error => options.error,
                draft => options.draft.unwrap_or_default(),
            })
            .map_err(|e| DomainError::internal(format!("failed to render chat page: {e}")))
    }
}
