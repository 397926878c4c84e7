//! Configuration for chat-completion providers

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default system instruction sent with every record
pub const DEFAULT_SYSTEM_PROMPT: &str = "You transform JSON records. \
Return ONLY the transformed record as a JSON value, without markdown or explanation.";

/// Provider settings
///
/// # Examples
///
/// ```
/// use forge_llm::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert!(config.validate().is_ok());
/// assert!(config.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token; usually supplied through the environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on completion tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP-level timeout for one request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// System instruction sent with every record
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_request_timeout() -> u64 {
    60
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl LlmConfig {
    /// Request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("llm.base_url must not be empty".to_string());
        }
        if self.model.trim().is_empty() {
            return Err("llm.model must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("llm.temperature must be within [0, 2]".to_string());
        }
        if self.max_tokens == 0 {
            return Err("llm.max_tokens must be greater than 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("llm.request_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
