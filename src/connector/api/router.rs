use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::ReplyEvent;
use crate::domain::{DomainError, SessionId};

use super::container::Container;
use super::controller::{ChatController, MessageController, SessionController};
use super::error::{status_for, user_message, ApiError, ErrorBody};
use super::view::RenderedTurn;

type AppState = State<Arc<Container>>;

#[derive(Debug, Deserialize)]
pub struct MessageInput {
    pub content: String,
}

/// HTTP surface of the chat loop. Every route below `/sessions/{id}` operates
/// on exactly one session's history.
pub fn router(container: Arc<Container>) -> Router {
    Router::new()
        .route("/", get(new_chat))
        .route("/health", get(health))
        .route("/sessions/{id}", get(chat_page).delete(end_session))
        .route("/sessions/{id}/messages", post(post_message))
        .route("/sessions/{id}/stream", post(stream_message))
        .route("/sessions/{id}/history", get(history))
        .route("/sessions/{id}/cancel", post(cancel))
        .with_state(container)
}

fn session_url(id: &SessionId) -> String {
    format!("/sessions/{id}")
}

async fn new_chat(State(container): AppState) -> Result<Redirect, ApiError> {
    let session = ChatController::new(&container).start().await?;
    info!(session = %session.id(), "New chat session");
    Ok(Redirect::to(&session_url(session.id())))
}

async fn chat_page(State(container): AppState, Path(id): Path<String>) -> Response {
    let controller = ChatController::new(&container);
    let id = SessionId::from(id);

    let session = match controller.open(&id).await {
        Ok(session) => session,
        Err(e) if e.is_not_found() => return Redirect::to("/").into_response(),
        Err(e) => return ApiError(e).into_response(),
    };

    match controller.page(&session) {
        Ok(html) => Html(html).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Form submission without JavaScript: run the turn, then redirect back to
/// the page (post/redirect/get). Failures re-render the page with a banner.
async fn post_message(
    State(container): AppState,
    Path(id): Path<String>,
    Form(input): Form<MessageInput>,
) -> Response {
    let id = SessionId::from(id);

    let error = match MessageController::new(&container).send(&id, &input.content).await {
        Ok(_) => return Redirect::to(&session_url(&id)).into_response(),
        Err(e) if e.is_not_found() => return Redirect::to("/").into_response(),
        Err(e) => e,
    };

    let chat = ChatController::new(&container);
    let session = match chat.open(&id).await {
        Ok(session) => session,
        Err(e) => return ApiError(e).into_response(),
    };

    // The user turn is only recorded once the turn has started.
    let draft = match error {
        DomainError::Busy(_) | DomainError::InvalidInput(_) => input.content.as_str(),
        _ => "",
    };

    match chat.page_with_error(&session, &user_message(&error), draft) {
        Ok(html) => (status_for(&error), Html(html)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Streamed turn: `delta` events carry JSON-encoded text fragments, then
/// exactly one `done` (the assistant turn with its rendered HTML) or `error`
/// event ends the stream.
async fn stream_message(
    State(container): AppState,
    Path(id): Path<String>,
    Json(input): Json<MessageInput>,
) -> Result<Response, ApiError> {
    let id = SessionId::from(id);
    let replies = MessageController::new(&container)
        .stream(&id, &input.content)
        .await?;

    let events = replies.map(|item| {
        let event = match item {
            Ok(ReplyEvent::Delta(text)) => json_event("delta", &text),
            Ok(ReplyEvent::Done(turn)) => json_event("done", &RenderedTurn::from(&turn)),
            Err(e) => json_event("error", &ErrorBody::from_error(&e)),
        };
        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default().event(name).json_data(payload).unwrap_or_else(|e| {
        warn!("Failed to encode {name} event: {e}");
        Event::default()
            .event("error")
            .data(r#"{"kind":"internal","message":"Something went wrong on the server."}"#)
    })
}

async fn history(State(container): AppState, Path(id): Path<String>) -> Result<Response, ApiError> {
    let view = SessionController::new(&container)
        .history(&SessionId::from(id))
        .await?;
    Ok(Json(view).into_response())
}

#[derive(Serialize)]
struct CancelView {
    cancelled: bool,
}

async fn cancel(State(container): AppState, Path(id): Path<String>) -> Result<Response, ApiError> {
    let cancelled = SessionController::new(&container)
        .cancel(&SessionId::from(id))
        .await?;
    Ok(Json(CancelView { cancelled }).into_response())
}

async fn end_session(
    State(container): AppState,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    SessionController::new(&container)
        .end(&SessionId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(container): AppState) -> Result<Response, ApiError> {
    let view = SessionController::new(&container).health().await?;
    Ok(Json(view).into_response())
}
