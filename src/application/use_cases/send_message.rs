use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::{RespondUseCase, TextStream};
use crate::domain::{ChatTurn, DomainError, Session, TurnGuard};

pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// What a streamed turn produces: text pieces, then exactly one `Done`
/// carrying the assistant turn that was appended to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    Delta(String),
    Done(ChatTurn),
}

pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<ReplyEvent, DomainError>> + Send>>;

/// Runs one turn of the chat loop against a session.
///
/// The user turn is recorded before the pipeline is called, so a failed turn
/// leaves the user message in the history without an assistant reply. Every
/// turn is bounded by a timeout and can be cancelled through the session.
pub struct SendMessageUseCase {
    respond: Arc<RespondUseCase>,
    turn_timeout: Duration,
}

impl SendMessageUseCase {
    pub fn new(respond: Arc<RespondUseCase>) -> Self {
        Self {
            respond,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn turn_timeout(&self) -> Duration {
        self.turn_timeout
    }

    pub async fn send(&self, session: &Arc<Session>, user_text: &str) -> Result<ChatTurn, DomainError> {
        let (guard, prior) = self.open_turn(session, user_text)?;
        let deadline = Instant::now() + self.turn_timeout;

        let reply = bounded(
            guard.token(),
            deadline,
            self.turn_timeout,
            self.respond.respond(Some(&prior), user_text),
        )
        .await;

        match reply {
            Ok(text) => {
                let turn = ChatTurn::assistant(text);
                session.append(turn.clone());
                info!(session = %session.id(), turns = session.len(), "Turn completed");
                Ok(turn)
            }
            Err(e) => {
                warn!(session = %session.id(), "Turn failed: {e}");
                Err(e)
            }
        }
    }

    pub async fn stream(&self, session: &Arc<Session>, user_text: &str) -> Result<ReplyStream, DomainError> {
        let (guard, prior) = self.open_turn(session, user_text)?;
        let deadline = Instant::now() + self.turn_timeout;

        let opened = if self.respond.is_streaming() {
            bounded(
                guard.token(),
                deadline,
                self.turn_timeout,
                self.respond.respond_stream(Some(&prior), user_text),
            )
            .await
        } else {
            bounded(
                guard.token(),
                deadline,
                self.turn_timeout,
                self.respond.respond(Some(&prior), user_text),
            )
            .await
            .map(|text| Box::pin(stream::once(async move { Ok::<_, DomainError>(text) })) as TextStream)
        };

        let pieces = opened.inspect_err(|e| {
            warn!(session = %session.id(), "Turn failed before streaming: {e}");
        })?;

        Ok(reply_stream(pieces, guard, deadline, self.turn_timeout))
    }

    /// Validates the input, enters `Processing`, and records the user turn.
    /// Returns the turns that preceded this one.
    fn open_turn(
        &self,
        session: &Arc<Session>,
        user_text: &str,
    ) -> Result<(TurnGuard, Vec<ChatTurn>), DomainError> {
        if user_text.trim().is_empty() {
            return Err(DomainError::invalid_input("message is empty"));
        }

        let guard = session.begin_turn()?;
        let prior = session.all();
        session.append(ChatTurn::user(user_text));
        debug!(session = %session.id(), "Turn started with {} prior turns", prior.len());

        Ok((guard, prior))
    }
}

async fn bounded<T, F>(
    token: &CancellationToken,
    deadline: Instant,
    limit: Duration,
    fut: F,
) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(DomainError::Cancelled),
        result = tokio::time::timeout_at(deadline, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(timed_out(limit)),
        },
    }
}

fn timed_out(limit: Duration) -> DomainError {
    DomainError::timeout(format!("no reply within {}s", limit.as_secs_f64()))
}

struct ReplyState {
    pieces: TextStream,
    guard: Option<TurnGuard>,
    buffer: String,
    deadline: Instant,
    limit: Duration,
}

fn reply_stream(pieces: TextStream, guard: TurnGuard, deadline: Instant, limit: Duration) -> ReplyStream {
    let state = ReplyState {
        pieces,
        guard: Some(guard),
        buffer: String::new(),
        deadline,
        limit,
    };

    // The guard lives in the state: the turn stays `Processing` until the
    // stream finishes, fails, or is dropped.
    let events = stream::unfold(state, |mut state| async move {
        let token = state.guard.as_ref()?.token().clone();

        let next = tokio::select! {
            _ = token.cancelled() => Some(Err(DomainError::Cancelled)),
            result = tokio::time::timeout_at(state.deadline, state.pieces.next()) => match result {
                Ok(item) => item,
                Err(_) => Some(Err(timed_out(state.limit))),
            },
        };

        match next {
            Some(Ok(piece)) => {
                state.buffer.push_str(&piece);
                Some((Ok(ReplyEvent::Delta(piece)), state))
            }
            Some(Err(e)) => {
                if let Some(guard) = state.guard.take() {
                    warn!(session = %guard.session().id(), "Streamed turn failed: {e}");
                }
                Some((Err(e), state))
            }
            None => {
                let guard = state.guard.take()?;
                let turn = ChatTurn::assistant(std::mem::take(&mut state.buffer));
                let session = guard.session();
                session.append(turn.clone());
                info!(session = %session.id(), turns = session.len(), "Streamed turn completed");
                drop(guard);
                Some((Ok(ReplyEvent::Done(turn)), state))
            }
        }
    });

    Box::pin(events)
}
