use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;

/// `DomainError` as an HTTP response: a status code plus a JSON body.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

/// Body of every error response and of the SSE `error` event.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn from_error(error: &DomainError) -> Self {
        Self {
            kind: error_kind(error),
            message: user_message(error),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_error(&self.0);
        (status_for(&self.0), Json(body)).into_response()
    }
}

pub fn status_for(error: &DomainError) -> StatusCode {
    match error {
        DomainError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Busy(_) => StatusCode::CONFLICT,
        DomainError::RateLimitError(_) => StatusCode::TOO_MANY_REQUESTS,
        DomainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        // nginx's "client closed request"
        DomainError::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
        }
        DomainError::TransportError(_)
        | DomainError::AuthenticationError(_)
        | DomainError::ServiceError { .. } => StatusCode::BAD_GATEWAY,
        DomainError::ConfigError(_) | DomainError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn error_kind(error: &DomainError) -> &'static str {
    match error {
        DomainError::ConfigError(_) => "config",
        DomainError::TransportError(_) => "transport",
        DomainError::AuthenticationError(_) => "authentication",
        DomainError::RateLimitError(_) => "rate_limit",
        DomainError::ServiceError { .. } => "service",
        DomainError::Timeout(_) => "timeout",
        DomainError::Cancelled => "cancelled",
        DomainError::Busy(_) => "busy",
        DomainError::NotFound(_) => "not_found",
        DomainError::InvalidInput(_) => "invalid_input",
        DomainError::Internal(_) => "internal",
    }
}

/// Text shown to the person chatting. Provider details stay in the logs.
pub fn user_message(error: &DomainError) -> String {
    match error {
        DomainError::TransportError(_) => {
            "Could not reach the completion service. Please try again.".to_string()
        }
        DomainError::AuthenticationError(_) => {
            "The completion service rejected the configured API key.".to_string()
        }
        DomainError::RateLimitError(_) => {
            "The completion service is rate limiting requests. Try again shortly.".to_string()
        }
        DomainError::ServiceError { status, .. } => {
            format!("The completion service returned an error (status {status}).")
        }
        DomainError::Timeout(_) => "The completion service did not answer in time.".to_string(),
        DomainError::Cancelled => "The request was cancelled.".to_string(),
        DomainError::Busy(_) => "Still answering the previous message.".to_string(),
        DomainError::NotFound(_) => "This chat session no longer exists.".to_string(),
        DomainError::InvalidInput(msg) => format!("Invalid message: {msg}."),
        DomainError::ConfigError(_) | DomainError::Internal(_) => {
            "Something went wrong on the server.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failures_are_bad_gateway() {
        assert_eq!(
            status_for(&DomainError::service(500, "boom")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DomainError::authentication("bad key")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DomainError::rate_limit("slow")),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn cancelled_uses_client_closed_status() {
        assert_eq!(status_for(&DomainError::Cancelled).as_u16(), 499);
    }

    #[test]
    fn user_message_hides_provider_details() {
        let message = user_message(&DomainError::authentication("sk-abc is invalid"));
        assert!(!message.contains("sk-abc"));
    }
}
