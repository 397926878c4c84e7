//! Adapter from a chat-completion provider to the engine's Transformer

use crate::{LlmError, LlmProvider};
use async_trait::async_trait;
use forge_domain::{ErrorKind, Payload, TransformError, Transformer};
use tracing::debug;

/// Turns each record into one chat request and parses the reply as JSON
///
/// The record is sent as pretty-printed JSON in the user message; the reply
/// must be a JSON value, optionally wrapped in a markdown code block.
///
/// # Examples
///
/// ```
/// use forge_domain::Transformer;
/// use forge_llm::{LlmTransformer, ScriptedProvider};
/// use serde_json::json;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let provider = ScriptedProvider::new("```json\n{\"english\": \"Hi\"}\n```");
/// let transformer = LlmTransformer::new(provider, "Clean the record.");
///
/// let out = rt.block_on(transformer.transform(&json!({"english": "hi"}))).unwrap();
/// assert_eq!(out, json!({"english": "Hi"}));
/// ```
pub struct LlmTransformer<P: LlmProvider> {
    provider: P,
    system_prompt: String,
}

impl<P: LlmProvider> LlmTransformer<P> {
    /// Wrap a provider with the system instruction sent for every record
    pub fn new(provider: P, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
        }
    }

    /// Borrow the underlying provider
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

/// Render the user message for one record
fn build_user_message(payload: &Payload) -> Result<String, TransformError> {
    if payload.is_null() {
        return Err(TransformError::new(
            ErrorKind::MalformedRequest,
            "Record has no content",
        ));
    }

    let record = serde_json::to_string_pretty(payload)
        .map_err(|e| TransformError::new(ErrorKind::MalformedRequest, e.to_string()))?;

    Ok(format!(
        "Transform this record:\n\n{}\n\nReturn the result as JSON.",
        record
    ))
}

/// Strip a surrounding markdown code block, if any
fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    // Skip the opening fence line (``` or ```json) and the closing fence
    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return "",
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse the provider reply into a payload
fn parse_reply(reply: &str) -> Result<Payload, LlmError> {
    let json = extract_json(reply);
    if json.is_empty() {
        return Err(LlmError::InvalidResponse("Empty response".to_string()));
    }
    serde_json::from_str(json)
        .map_err(|e| LlmError::InvalidResponse(format!("JSON parse error: {}", e)))
}

#[async_trait]
impl<P: LlmProvider> Transformer for LlmTransformer<P> {
    async fn transform(&self, payload: &Payload) -> Result<Payload, TransformError> {
        let user = build_user_message(payload)?;
        debug!("Prompt length: {} chars", user.len());

        let reply = self.provider.complete(&self.system_prompt, &user).await?;
        debug!("LLM response length: {} chars", reply.len());

        Ok(parse_reply(&reply)?)
    }

    fn name(&self) -> &str {
        self.provider.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedProvider;
    use serde_json::json;

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_fenced() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n[1, 2]\n```\n"), "[1, 2]");
        assert_eq!(extract_json("```"), "");
    }

    #[test]
    fn test_parse_reply_rejects_prose() {
        let err = parse_reply("Sure! Here is your record.").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_user_message_contains_record() {
        let msg = build_user_message(&json!({"english": "Hello", "hindi": "नमस्ते"})).unwrap();
        assert!(msg.contains("\"english\": \"Hello\""));
        assert!(msg.contains("नमस्ते"));
    }

    #[tokio::test]
    async fn test_null_payload_is_malformed_without_calling_provider() {
        let provider = ScriptedProvider::default();
        let transformer = LlmTransformer::new(provider.clone(), "sys");

        let err = transformer.transform(&Payload::Null).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedRequest);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_is_classified() {
        let mut provider = ScriptedProvider::default();
        provider.add_error("boom", LlmError::ServerError { status: 503, body: "busy".into() });
        let transformer = LlmTransformer::new(provider, "sys");

        let err = transformer.transform(&json!({"text": "boom"})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerError);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_transform_success() {
        let mut provider = ScriptedProvider::default();
        provider.add_response("first", r#"{"english": "First."}"#);
        let transformer = LlmTransformer::new(provider, "sys");

        let out = transformer.transform(&json!({"english": "first"})).await.unwrap();
        assert_eq!(out, json!({"english": "First."}));
        assert_eq!(transformer.name(), "scripted");
    }
}
