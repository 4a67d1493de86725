//! LLM Client module for Neura
//!
//! Provides the provider-agnostic request types, the `LlmClient` trait and the
//! Gemini implementation.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod gemini;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use gemini::GeminiClient;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, StreamChunk,
    TokenUsage, ToolCall, ToolDefinition, WebSource,
};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "gemini" => {
            debug!("create_client: creating Gemini client");
            Ok(Arc::new(GeminiClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::InvalidResponse(format!(
                "Unknown LLM provider: '{}'. Supported: gemini",
                other
            )))
        }
    }
}

/// Text of the first ```json fenced block, or the whole reply when there is none
pub fn strip_json_fence(text: &str) -> &str {
    let Some(start) = text.find("```json") else {
        return text.trim();
    };
    let body = &text[start + "```json".len()..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => text.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "anthropic".to_string(),
            ..Default::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("Supported: gemini"));
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence("Here you go:\n```json\n[1]\n```\nEnjoy"), "[1]");
        assert_eq!(strip_json_fence("  {\"a\":1}  "), "{\"a\":1}");
        // Unterminated fence: leave the reply alone
        assert_eq!(strip_json_fence("```json\n{"), "```json\n{");
    }
}
