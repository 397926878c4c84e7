//! OpenAI-compatible chat-completion provider
//!
//! Works with any endpoint that implements `POST {base_url}/chat/completions`
//! (OpenAI, OpenRouter, local servers). One call is one HTTP request; retries
//! are left to the caller.
//!
//! # Examples
//!
//! ```no_run
//! use forge_llm::{LlmConfig, LlmProvider, OpenAiProvider};
//!
//! # async fn example() -> Result<(), forge_llm::LlmError> {
//! let config = LlmConfig {
//!     api_key: Some("sk-...".to_string()),
//!     ..Default::default()
//! };
//! let provider = OpenAiProvider::new(&config)?;
//! let reply = provider.complete("You are terse.", "Say hello").await?;
//! # Ok(())
//! # }
//! ```

use crate::{LlmConfig, LlmError, LlmProvider};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Longest error body kept in an [`LlmError`]
const MAX_ERROR_BODY: usize = 512;

/// Provider for OpenAI-compatible chat-completion APIs
pub struct OpenAiProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

/// Request body for the chat completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response from the chat completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider from configuration
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        config.validate().map_err(LlmError::Config)?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map a non-success HTTP status to a classified error
fn status_error(status: StatusCode, body: String, model: &str) -> LlmError {
    let mut body = body;
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(body),
        StatusCode::NOT_FOUND => LlmError::ModelNotAvailable(model.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
        s if s.is_server_error() => LlmError::ServerError {
            status: s.as_u16(),
            body,
        },
        s if s.is_client_error() => LlmError::BadRequest(format!("HTTP {}: {}", s, body)),
        s => LlmError::Communication(format!("Unexpected HTTP {}: {}", s, body)),
    }
}

/// Map a transport-level failure to a classified error
fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else if e.is_decode() {
        LlmError::InvalidResponse(format!("Failed to decode response: {}", e))
    } else {
        LlmError::Communication(format!("Request failed: {}", e))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!("Chat completion returned HTTP {}", status);

        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, text, &self.model));
        }

        let parsed: ChatResponse = response.json().await.map_err(transport_error)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LlmError::InvalidResponse("Response contained no message content".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let config = LlmConfig {
            base_url: "http://localhost:1234/v1/".to_string(),
            model: "local-model".to_string(),
            ..Default::default()
        };
        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(provider.model(), "local-model");
    }

    #[test]
    fn test_provider_rejects_invalid_config() {
        let config = LlmConfig {
            model: String::new(),
            ..Default::default()
        };
        assert!(matches!(OpenAiProvider::new(&config), Err(LlmError::Config(_))));
    }

    #[test]
    fn test_status_mapping() {
        let m = "gpt";
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new(), m),
            LlmError::RateLimitExceeded
        );
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "nope".into(), m),
            LlmError::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new(), m),
            LlmError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, String::new(), m),
            LlmError::BadRequest(_)
        ));
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, String::new(), m),
            LlmError::ModelNotAvailable("gpt".to_string())
        );
    }

    #[test]
    fn test_status_error_truncates_body() {
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(2000), "gpt");
        match err {
            LlmError::ServerError { body, .. } => assert_eq!(body.len(), MAX_ERROR_BODY),
            other => panic!("Expected ServerError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 5,
            ..Default::default()
        };
        let provider = OpenAiProvider::new(&config).unwrap();

        let err = provider.complete("sys", "user").await.unwrap_err();
        assert!(
            matches!(err, LlmError::Communication(_) | LlmError::Timeout),
            "unexpected error: {:?}",
            err
        );
    }

    // Integration test (requires a reachable endpoint and FORGE_LLM_API_KEY)
    #[tokio::test]
    #[ignore]
    async fn test_openai_complete_integration() {
        let config = LlmConfig {
            api_key: std::env::var("FORGE_LLM_API_KEY").ok(),
            ..Default::default()
        };
        let provider = OpenAiProvider::new(&config).unwrap();
        let reply = provider.complete("Be terse.", "Say 'hello' and nothing else").await;
        if let Ok(text) = reply {
            assert!(!text.is_empty());
        }
    }
}
