//! Google Gemini API client implementation
//!
//! Implements the LlmClient trait for the Generative Language API with
//! support for blocking, SSE streaming and image generation calls.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, Role,
    StopReason, StreamChunk, TokenUsage, ToolCall, WebSource,
};
use crate::config::LlmConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504)
}

/// Gemini API client
pub struct GeminiClient {
    model: String,
    image_model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            image_model: config.image_model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn model_for<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.model)
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    /// Build the request body for generateContent / streamGenerateContent
    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        debug!(tools = request.tools.len(), search = request.search, "build_request_body: called");
        let max_tokens = if request.max_tokens == 0 {
            self.max_tokens
        } else {
            request.max_tokens.min(self.max_tokens)
        };

        let mut body = serde_json::json!({
            "contents": self.convert_messages(&request.messages),
            "generationConfig": { "maxOutputTokens": max_tokens },
        });

        if !request.system_prompt.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": request.system_prompt }] });
        }

        // Function calling and search grounding cannot share a request
        if !request.tools.is_empty() {
            if request.search {
                warn!("build_request_body: dropping search grounding, request carries function declarations");
            }
            body["tools"] = serde_json::json!([{
                "functionDeclarations": request
                    .tools
                    .iter()
                    .map(|t| t.to_gemini_declaration())
                    .collect::<Vec<_>>()
            }]);
        } else if request.search {
            debug!("build_request_body: enabling search grounding");
            body["tools"] = serde_json::json!([{ "googleSearch": {} }]);
        }

        body
    }

    /// Convert internal Message types to Gemini `contents`
    fn convert_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        debug!(message_count = %messages.len(), "convert_messages: called");
        // functionResponse parts are matched by name, not by call id
        let tool_names: HashMap<&str, &str> = messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Blocks(blocks) => Some(blocks),
                MessageContent::Text(_) => None,
            })
            .flatten()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
                _ => None,
            })
            .collect();

        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                let parts = match &msg.content {
                    MessageContent::Text(text) => vec![serde_json::json!({ "text": text })],
                    MessageContent::Blocks(blocks) => blocks
                        .iter()
                        .map(|b| convert_content_block(b, &tool_names))
                        .collect(),
                };
                serde_json::json!({ "role": role, "parts": parts })
            })
            .collect()
    }

    /// POST with retry on transient failures
    async fn post_with_retry(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "post_with_retry: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    debug!(attempt, "post_with_retry: timeout");
                    last_error = Some(LlmError::Timeout(self.timeout));
                    continue;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "post_with_retry: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                debug!("post_with_retry: rate limited (429)");
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "post_with_retry: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "post_with_retry: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError { status, message: text });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

/// Convert a ContentBlock to a Gemini part
fn convert_content_block(block: &ContentBlock, tool_names: &HashMap<&str, &str>) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({ "text": text }),
        ContentBlock::ToolUse { id, name, input } => {
            debug!(%id, %name, "convert_content_block: ToolUse block");
            serde_json::json!({ "functionCall": { "name": name, "args": input } })
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let name = tool_names.get(tool_use_id.as_str()).copied().unwrap_or("tool");
            debug!(%tool_use_id, %name, %is_error, "convert_content_block: ToolResult block");
            serde_json::json!({
                "functionResponse": {
                    "name": name,
                    "response": { "content": content, "is_error": is_error },
                }
            })
        }
    }
}

/// Folds one or many GenerateContentResponse payloads into a CompletionResponse
#[derive(Default)]
struct ResponseAccumulator {
    text: String,
    tool_calls: Vec<ToolCall>,
    stop_reason: StopReason,
    usage: TokenUsage,
    sources: Vec<WebSource>,
}

impl ResponseAccumulator {
    /// Absorb one payload, returning the chunks it contributes
    fn absorb(&mut self, payload: GenerateContentResponse) -> Vec<StreamChunk> {
        let mut chunks = Vec::new();

        if let Some(usage) = payload.usage_metadata {
            self.usage = TokenUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
                cached_tokens: usage.cached_content_token_count,
            };
        }

        let Some(candidate) = payload.candidates.into_iter().next() else {
            return chunks;
        };

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if part.thought {
                continue;
            }
            if let Some(text) = part.text
                && !text.is_empty()
            {
                self.text.push_str(&text);
                chunks.push(StreamChunk::TextDelta(text));
            }
            if let Some(call) = part.function_call {
                let id = call
                    .id
                    .unwrap_or_else(|| format!("gemini_call_{}", self.tool_calls.len() + 1));
                let input = if call.args.is_object() {
                    call.args
                } else {
                    serde_json::json!({})
                };
                debug!(%id, name = %call.name, "absorb: function call");
                chunks.push(StreamChunk::ToolCall {
                    id: id.clone(),
                    name: call.name.clone(),
                });
                self.tool_calls.push(ToolCall {
                    id,
                    name: call.name,
                    input,
                });
            }
        }

        if let Some(reason) = candidate.finish_reason {
            self.stop_reason = StopReason::from_gemini(&reason);
        }

        if let Some(grounding) = candidate.grounding_metadata {
            for web in grounding.grounding_chunks.into_iter().filter_map(|c| c.web) {
                if let Some(uri) = web.uri
                    && !self.sources.iter().any(|s| s.uri == uri)
                {
                    self.sources.push(WebSource {
                        uri,
                        title: web.title.unwrap_or_default(),
                    });
                }
            }
        }

        chunks
    }

    fn finish(self) -> CompletionResponse {
        let stop_reason = if self.tool_calls.is_empty() {
            self.stop_reason
        } else {
            StopReason::ToolUse
        };
        CompletionResponse {
            content: if self.text.is_empty() { None } else { Some(self.text) },
            tool_calls: self.tool_calls,
            stop_reason,
            usage: self.usage,
            sources: self.sources,
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = self.model_for(&request);
        debug!(%model, "complete: called");
        let url = self.endpoint(model, "generateContent");
        let body = self.build_request_body(&request);

        let response = self.post_with_retry(&url, &body).await?;
        let payload: GenerateContentResponse = response.json().await?;

        let mut acc = ResponseAccumulator::default();
        acc.absorb(payload);
        debug!("complete: success");
        Ok(acc.finish())
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        let model = self.model_for(&request);
        debug!(%model, "stream: called");
        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        let body = self.build_request_body(&request);

        let http_request = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = EventSource::new(http_request).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let mut acc = ResponseAccumulator::default();

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    debug!("stream: Event::Open");
                }
                Ok(Event::Message(msg)) => {
                    let payload: GenerateContentResponse = serde_json::from_str(&msg.data)?;
                    for chunk in acc.absorb(payload) {
                        let _ = chunk_tx.send(chunk).await;
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    debug!("stream: stream ended");
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    es.close();
                    let status = status.as_u16();
                    let err = if status == 429 {
                        LlmError::RateLimited {
                            retry_after: Duration::from_secs(60),
                        }
                    } else {
                        LlmError::ApiError {
                            status,
                            message: response.text().await.unwrap_or_default(),
                        }
                    };
                    debug!(%err, "stream: bad status");
                    let _ = chunk_tx.send(StreamChunk::Error(err.to_string())).await;
                    return Err(err);
                }
                Err(e) => {
                    es.close();
                    debug!(%e, "stream: Event error");
                    let _ = chunk_tx.send(StreamChunk::Error(e.to_string())).await;
                    return Err(LlmError::InvalidResponse(e.to_string()));
                }
            }
        }
        es.close();

        let response = acc.finish();
        debug!(tool_calls = response.tool_calls.len(), "stream: complete");
        let _ = chunk_tx
            .send(StreamChunk::MessageDone {
                stop_reason: response.stop_reason.clone(),
                usage: response.usage.clone(),
            })
            .await;
        Ok(response)
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.image_model, "generate_image: called");
        let url = self.endpoint(&self.image_model, "predict");
        let body = serde_json::json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": "1:1",
                "outputMimeType": "image/jpeg",
            },
        });

        let response = self.post_with_retry(&url, &body).await?;
        let payload: PredictResponse = response.json().await?;
        payload
            .predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded)
            .ok_or_else(|| LlmError::InvalidResponse("No image data found in the model's response.".to_string()))
    }
}

// Gemini API response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
}
