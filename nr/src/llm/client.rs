//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Generative model capability used by every Neura component
///
/// Calls are stateless: conversational sessions keep their own history and
/// send the whole transcript with each request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion
    ///
    /// Sends chunks to the provided channel as they arrive.
    /// Returns the final complete response.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;

    /// Generate one square JPEG from a text prompt, returned base64-encoded
    async fn generate_image(&self, prompt: &str) -> Result<String, LlmError> {
        let _ = prompt;
        Err(LlmError::Unsupported("image generation".to_string()))
    }
}
