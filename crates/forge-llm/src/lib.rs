//! Forge LLM Provider Layer
//!
//! Chat-completion providers and the adapter that turns a provider into the
//! engine's [`Transformer`](forge_domain::Transformer).
//!
//! # Architecture
//!
//! ```text
//! Payload → LlmTransformer → LlmProvider::complete → response text → JSON payload
//! ```
//!
//! Providers never retry on their own. Every failure is returned as an
//! [`LlmError`] and classified into a [`forge_domain::ErrorKind`] once, so the
//! engine's retry policy is the single place that decides what happens next.
//!
//! # Providers
//!
//! - `ScriptedProvider`: Deterministic scripted replies for testing
//! - `OpenAiProvider`: Any OpenAI-compatible `/chat/completions` endpoint
//!
//! # Examples
//!
//! ```
//! use forge_llm::{LlmProvider, ScriptedProvider};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let provider = ScriptedProvider::new(r#"{"english": "hello"}"#);
//! let reply = rt.block_on(provider.complete("system", "user")).unwrap();
//! assert_eq!(reply, r#"{"english": "hello"}"#);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod openai;
pub mod transformer;

use async_trait::async_trait;
use forge_domain::{ErrorKind, TransformError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use config::LlmConfig;
pub use openai::OpenAiProvider;
pub use transformer::LlmTransformer;

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network or connection failure before a response arrived
    #[error("Communication error: {0}")]
    Communication(String),

    /// Request exceeded its timeout
    #[error("Request timed out")]
    Timeout,

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider-side failure (5xx)
    #[error("Server error (HTTP {status}): {body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider rejected the request as invalid
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider could not be constructed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Classify this error for the retry policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Communication(_) => ErrorKind::Connection,
            LlmError::Timeout => ErrorKind::Timeout,
            LlmError::RateLimitExceeded => ErrorKind::RateLimited,
            LlmError::ServerError { .. } => ErrorKind::ServerError,
            LlmError::Authentication(_) => ErrorKind::Authentication,
            LlmError::BadRequest(_)
            | LlmError::ModelNotAvailable(_)
            | LlmError::Config(_) => ErrorKind::MalformedRequest,
            LlmError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }
}

impl From<LlmError> for TransformError {
    fn from(e: LlmError) -> Self {
        TransformError::new(e.kind(), e.to_string())
    }
}

/// A chat-completion backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one system + user message pair and return the reply text
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Model identifier used in logs
    fn model(&self) -> &str;
}

/// Scripted LLM provider for deterministic testing
///
/// Replies are chosen by the first registered needle contained in the user
/// message. A needle can carry a queue of errors that are returned (one per
/// call) before its response is served, which makes transient failures easy
/// to simulate.
///
/// # Examples
///
/// ```
/// use forge_llm::{LlmError, LlmProvider, ScriptedProvider};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let mut provider = ScriptedProvider::default();
/// provider.add_response("alpha", "A");
/// provider.add_failures("beta", vec![LlmError::RateLimitExceeded], "B");
///
/// assert_eq!(rt.block_on(provider.complete("", "alpha")).unwrap(), "A");
/// assert!(rt.block_on(provider.complete("", "beta")).is_err());
/// assert_eq!(rt.block_on(provider.complete("", "beta")).unwrap(), "B");
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    default_response: String,
    script: Arc<Mutex<Vec<ScriptEntry>>>,
    call_count: Arc<Mutex<usize>>,
}

#[derive(Debug)]
struct ScriptEntry {
    needle: String,
    failures: VecDeque<LlmError>,
    reply: Result<String, LlmError>,
}

impl ScriptedProvider {
    /// Create a provider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            script: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Reply with `response` whenever the user message contains `needle`
    pub fn add_response(&mut self, needle: impl Into<String>, response: impl Into<String>) {
        self.push(needle.into(), VecDeque::new(), Ok(response.into()));
    }

    /// Always fail with `error` whenever the user message contains `needle`
    pub fn add_error(&mut self, needle: impl Into<String>, error: LlmError) {
        self.push(needle.into(), VecDeque::new(), Err(error));
    }

    /// Fail with each of `failures` in turn, then reply with `response`
    pub fn add_failures(
        &mut self,
        needle: impl Into<String>,
        failures: Vec<LlmError>,
        response: impl Into<String>,
    ) {
        self.push(needle.into(), failures.into(), Ok(response.into()));
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner()) = 0;
    }

    fn push(&mut self, needle: String, failures: VecDeque<LlmError>, reply: Result<String, LlmError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptEntry {
                needle,
                failures,
                reply,
            });
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        *self.call_count.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = script.iter_mut().find(|e| user.contains(&e.needle)) {
            if let Some(failure) = entry.failures.pop_front() {
                return Err(failure);
            }
            return entry.reply.clone();
        }

        Ok(self.default_response.clone())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
