use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::domain::DomainError;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Completion settings fixed at process start.
///
/// `temperature = 0` biases the model toward its lowest-variance answer;
/// `stream` asks the service for incremental delivery.
#[derive(Clone)]
pub struct PipelineConfig {
    api_key: SecretString,
    model_id: String,
    temperature: f32,
    stream: bool,
}

impl PipelineConfig {
    /// Fails with `ConfigError` when the credential is empty or blank.
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Result<Self, DomainError> {
        let api_key: String = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DomainError::config(format!("{API_KEY_VAR} is empty")));
        }

        let model_id: String = model_id.into();
        if model_id.trim().is_empty() {
            return Err(DomainError::config("model id is empty"));
        }

        Ok(Self {
            api_key: SecretString::from(api_key),
            model_id,
            temperature: DEFAULT_TEMPERATURE,
            stream: true,
        })
    }

    /// Read the credential through `lookup` (normally the process environment).
    pub fn from_lookup<F>(lookup: F, model_id: impl Into<String>) -> Result<Self, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup(API_KEY_VAR)
            .ok_or_else(|| DomainError::config(format!("{API_KEY_VAR} is not set")))?;
        Self::new(key, model_id)
    }

    pub fn from_env(model_id: impl Into<String>) -> Result<Self, DomainError> {
        Self::from_lookup(|name| std::env::var(name).ok(), model_id)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, DomainError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(DomainError::config(format!(
                "temperature must be within 0..=2, got {temperature}"
            )));
        }
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn stream(&self) -> bool {
        self.stream
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_key", &"[REDACTED]")
            .field("model_id", &self.model_id)
            .field("temperature", &self.temperature)
            .field("stream", &self.stream)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_config_error() {
        let result = PipelineConfig::from_lookup(|_| None, DEFAULT_MODEL);
        assert!(matches!(result, Err(DomainError::ConfigError(_))));
    }

    #[test]
    fn blank_key_is_config_error() {
        let result = PipelineConfig::from_lookup(|_| Some("   ".to_string()), DEFAULT_MODEL);
        assert!(matches!(result, Err(DomainError::ConfigError(_))));
    }

    #[test]
    fn defaults_follow_deterministic_streaming_setup() {
        let config =
            PipelineConfig::from_lookup(|_| Some("sk-test".to_string()), DEFAULT_MODEL).unwrap();
        assert_eq!(config.model_id(), "gpt-4o");
        assert_eq!(config.temperature(), 0.0);
        assert!(config.stream());
        assert_eq!(config.api_key(), "sk-test");
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = PipelineConfig::new("sk-very-secret", DEFAULT_MODEL).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let config = PipelineConfig::new("sk", DEFAULT_MODEL).unwrap();
        assert!(config.clone().with_temperature(3.5).is_err());
        assert_eq!(config.with_temperature(0.7).unwrap().temperature(), 0.7);
    }
}
