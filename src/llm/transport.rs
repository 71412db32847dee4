//! Wire transport to the generative model provider.
//!
//! [`LlmTransport`] is the seam between the retry policy and the network:
//! it sends one JSON request body and returns either the provider's success
//! envelope or a [`ProviderError`] carrying the HTTP status. Tests substitute
//! a scripted transport; production uses [`HttpTransport`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::models::truncate_chars;

/// Characters of a non-JSON error body kept in [`ProviderError::message`].
const ERROR_BODY_CHARS: usize = 500;

/// A failed delivery attempt. `status` is 0 when no HTTP response arrived.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider error {status}: {message}")]
pub struct ProviderError {
    pub status: u16,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait LlmTransport: Send + Sync {
    /// Deliver one request body and return the decoded success envelope.
    async fn send(&self, body: &Value) -> Result<Value, ProviderError>;
}

/// reqwest-backed transport for an OpenAI-style Responses endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// Build the transport, reading the API key from `config.api_key_env`.
    ///
    /// A missing key is a hard failure: the pipeline cannot answer anything
    /// without it.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{} not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl LlmTransport for HttpTransport {
    async fn send(&self, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::new(0, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::new(0, e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::new(status.as_u16(), error_message(&text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| ProviderError::new(0, format!("invalid response body: {}", e)))
    }
}

/// Pull `error.message` out of an error envelope, else the raw body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error").and_then(|e| match e {
                Value::String(s) => Some(s.clone()),
                other => other.get("message").and_then(Value::as_str).map(str::to_string),
            })
        })
        .unwrap_or_else(|| truncate_chars(body.trim(), ERROR_BODY_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_envelope() {
        let body = r#"{"error":{"message":"Tool web_search is not supported","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Tool web_search is not supported");
        assert_eq!(error_message(r#"{"error":"overloaded"}"#), "overloaded");
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_missing_api_key_fails_construction() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:9/v1/responses".into(),
            api_key_env: "AQA_TEST_KEY_THAT_IS_NEVER_SET".into(),
            primary_model: "m".into(),
            fallback_model: None,
            max_attempts: 3,
            timeout_secs: 5,
            temperature: 0.2,
            max_output_tokens: 100,
            web_search: false,
        };
        let err = HttpTransport::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("AQA_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
