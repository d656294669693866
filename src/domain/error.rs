use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Rate limit error: {0}")]
    RateLimitError(String),

    #[error("Service error ({status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::AuthenticationError(msg.into())
    }

    pub fn rate_limit(msg: impl Into<String>) -> Self {
        Self::RateLimitError(msg.into())
    }

    pub fn service(status: u16, msg: impl Into<String>) -> Self {
        Self::ServiceError {
            status,
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }

    /// Provider-side rejections, rate limiting included.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Self::ServiceError { .. } | Self::RateLimitError(_))
    }
}
