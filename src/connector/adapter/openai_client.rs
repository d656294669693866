use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::{CompletionService, CompletionStream};
use crate::connector::adapter::sse::{decode_chunks, ErrorPayload};
use crate::domain::{CompletionReply, CompletionRequest, DomainError, PipelineConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ErrorPayload,
}

/// HTTP client for the OpenAI Chat Completions API (and compatible servers).
///
/// The credential is sent as a bearer token on every request. Override the
/// endpoint with `OPENAI_BASE_URL` to target a local or proxy server:
///
/// ```text
/// OPENAI_BASE_URL=http://localhost:1234
/// ```
///
/// Only the connect phase has its own timeout here; the overall per-turn
/// deadline is enforced by the chat loop so that streamed replies are not cut
/// off by a whole-request timer.
pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    /// Full endpoint URL (base + COMPLETIONS_PATH).
    url: String,
}

impl OpenAiCompletionClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        let url = format!("{}{}", base.trim_end_matches('/'), COMPLETIONS_PATH);
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: SecretString::from(api_key.into()),
            model: model.into(),
            url,
        }
    }

    pub fn from_config(config: &PipelineConfig, base_url: impl Into<String>) -> Self {
        Self::new(config.api_key(), config.model_id(), base_url)
    }

    /// Base URL from `OPENAI_BASE_URL`, falling back to the public endpoint.
    pub fn configured_base_url() -> String {
        std::env::var(BASE_URL_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: &CompletionRequest, accept: &'static str) -> Result<reqwest::Response, DomainError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .header(header::ACCEPT, HeaderValue::from_static(accept))
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        Ok(response)
    }

    async fn process_error_response(response: reqwest::Response) -> DomainError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!("OpenAiCompletionClient: API returned {status}");
        debug!("OpenAiCompletionClient: error body: {body}");

        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });

        map_status(status, message)
    }
}

impl fmt::Debug for OpenAiCompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompletionClient")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("url", &self.url)
            .finish()
    }
}

fn map_status(status: StatusCode, message: String) -> DomainError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DomainError::authentication(message),
        StatusCode::TOO_MANY_REQUESTS => DomainError::rate_limit(message),
        _ => DomainError::service(status.as_u16(), message),
    }
}

fn map_transport_error(e: reqwest::Error) -> DomainError {
    if e.is_timeout() {
        DomainError::timeout(format!("request timed out: {e}"))
    } else {
        DomainError::transport(format!("request failed: {e}"))
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionReply, DomainError> {
        let response = self.post(request, "application/json").await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            DomainError::service(200, format!("failed to parse response: {e}"))
        })?;

        let choice = api_response.choices.into_iter().next();
        Ok(CompletionReply {
            finish_reason: choice.as_ref().and_then(|c| c.finish_reason.clone()),
            content: choice.and_then(|c| c.message.content),
            model: api_response.model,
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, DomainError> {
        let response = self.post(request, "text/event-stream").await?;
        debug!("OpenAiCompletionClient: streaming response from {}", self.url);

        Ok(Box::pin(decode_chunks(Box::pin(response.bytes_stream()))))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PromptMessage;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Json;
    use futures_util::StreamExt;

    /// Serve `handler` on an ephemeral local port and return its base URL.
    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request(text: &str, stream: bool) -> CompletionRequest {
        CompletionRequest::new(
            "gpt-4o",
            vec![
                PromptMessage::system("You are a helpful assistant."),
                PromptMessage::user(text),
            ],
        )
        .with_stream(stream)
    }

    fn error_route(status: StatusCode, message: &'static str) -> axum::Router {
        axum::Router::new().route(
            COMPLETIONS_PATH,
            post(move || async move {
                (
                    status,
                    Json(serde_json::json!({
                        "error": { "message": message, "type": "invalid_request_error" }
                    })),
                )
            }),
        )
    }

    #[tokio::test]
    async fn complete_sends_bearer_and_parses_reply() {
        let router = axum::Router::new().route(
            COMPLETIONS_PATH,
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer sk-test")
                );
                assert_eq!(body["model"], "gpt-4o");
                assert_eq!(body["temperature"], 0.0);
                assert_eq!(body["stream"], false);
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "What is the capital of France?");

                Json(serde_json::json!({
                    "model": "gpt-4o-2024-08-06",
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "Paris" },
                        "finish_reason": "stop"
                    }]
                }))
            }),
        );
        let base = serve(router).await;
        let client = OpenAiCompletionClient::new("sk-test", "gpt-4o", base);

        let reply = client
            .complete(&request("What is the capital of France?", false))
            .await
            .unwrap();

        assert_eq!(reply.content.as_deref(), Some("Paris"));
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let base = serve(error_route(StatusCode::UNAUTHORIZED, "Incorrect API key provided")).await;
        let client = OpenAiCompletionClient::new("bad", "gpt-4o", base);

        let err = client.complete(&request("hi", false)).await.unwrap_err();
        match err {
            DomainError::AuthenticationError(message) => assert!(message.contains("Incorrect API key")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limit() {
        let base = serve(error_route(StatusCode::TOO_MANY_REQUESTS, "Rate limit reached")).await;
        let client = OpenAiCompletionClient::new("sk-test", "gpt-4o", base);

        let err = client.complete(&request("hi", false)).await.unwrap_err();
        assert!(matches!(err, DomainError::RateLimitError(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_service_error() {
        let base = serve(error_route(StatusCode::BAD_GATEWAY, "upstream")).await;
        let client = OpenAiCompletionClient::new("sk-test", "gpt-4o", base);

        let err = client.stream(&request("hi", true)).await.err().unwrap();
        assert!(matches!(err, DomainError::ServiceError { status: 502, .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiCompletionClient::new("sk-test", "gpt-4o", format!("http://{addr}"));
        let err = client.complete(&request("hi", false)).await.unwrap_err();
        assert!(matches!(err, DomainError::TransportError(_)));
    }

    #[tokio::test]
    async fn stream_yields_chunks_from_event_stream() {
        let router = axum::Router::new().route(
            COMPLETIONS_PATH,
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["stream"], true);
                let sse = concat!(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
                    "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                    "data: [DONE]\n\n",
                );
                ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response()
            }),
        );
        let base = serve(router).await;
        let client = OpenAiCompletionClient::new("sk-test", "gpt-4o", base);

        let chunks: Vec<_> = client
            .stream(&request("hi", true))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let text: String = chunks.iter().filter_map(|c| c.delta.clone()).collect();
        assert_eq!(text, "Hello");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = OpenAiCompletionClient::new("k", "gpt-4o", "http://localhost:1234/");
        assert_eq!(client.url(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn debug_output_hides_the_key() {
        let client = OpenAiCompletionClient::new("sk-live-secret", "gpt-4o", DEFAULT_BASE_URL);
        let printed = format!("{client:?}");
        assert!(!printed.contains("sk-live-secret"));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("gpt-4o"));
    }
}
