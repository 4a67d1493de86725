//! A conversational session: system prompt, tools and running history
//!
//! The model API is stateless, so a session resends its whole history with
//! every turn. Tool calls are recorded as `ToolUse` blocks and answered with
//! `ToolResult` blocks in the following user turn.

use tokio::sync::mpsc;
use tracing::debug;

use crate::llm::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, Role,
    StreamChunk, ToolDefinition,
};

/// Where a session stood before a turn began
#[derive(Debug, Clone)]
pub struct Checkpoint {
    history_len: usize,
    deferred: Vec<ContentBlock>,
    pending_call: Option<String>,
}

pub struct ChatSession {
    goal_id: String,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    history: Vec<Message>,
    search: bool,
    /// Tool results held back until the student decides on a proposal
    deferred: Vec<ContentBlock>,
    /// Tool call id of the proposal awaiting a decision
    pending_call: Option<String>,
}

impl ChatSession {
    pub fn new(goal_id: impl Into<String>, system_prompt: impl Into<String>, history: Vec<Message>) -> Self {
        let goal_id = goal_id.into();
        debug!(%goal_id, history = history.len(), "ChatSession::new: called");
        Self {
            goal_id,
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            history,
            search: false,
            deferred: Vec::new(),
            pending_call: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_search(mut self, search: bool) -> Self {
        self.search = search;
        self
    }

    pub fn goal_id(&self) -> &str {
        &self.goal_id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn set_system_prompt(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = system_prompt.into();
    }

    /// Replace the history wholesale, dropping anything deferred
    pub fn set_history(&mut self, history: Vec<Message>) {
        debug!(len = history.len(), "ChatSession::set_history: called");
        self.history = history;
        self.deferred.clear();
        self.pending_call = None;
    }

    pub fn awaiting_decision(&self) -> bool {
        self.pending_call.is_some()
    }

    /// Request for the next model call over the current history
    pub fn request(&self) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            messages: self.history.clone(),
            tools: self.tools.clone(),
            search: self.search,
            ..Default::default()
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            history_len: self.history.len(),
            deferred: self.deferred.clone(),
            pending_call: self.pending_call.clone(),
        }
    }

    /// Forget everything recorded since `checkpoint`, so a failed turn leaves no trace
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        debug!(
            dropped = self.history.len().saturating_sub(checkpoint.history_len),
            "ChatSession::rollback: called"
        );
        self.history.truncate(checkpoint.history_len);
        self.deferred = checkpoint.deferred;
        self.pending_call = checkpoint.pending_call;
    }

    /// Append a user turn, carrying any deferred tool results ahead of the text
    ///
    /// Unanswered tool results already at the end of the history share the
    /// turn, so roles keep alternating.
    pub fn push_user(&mut self, text: &str) {
        debug!(deferred = self.deferred.len(), "ChatSession::push_user: called");
        let mut blocks = Vec::new();
        if self.history.last().is_some_and(|m| m.role == Role::User)
            && let Some(previous) = self.history.pop()
        {
            blocks = match previous.content {
                MessageContent::Blocks(blocks) => blocks,
                MessageContent::Text(earlier) => vec![ContentBlock::text(earlier)],
            };
        }
        blocks.append(&mut self.deferred);
        if blocks.is_empty() {
            self.history.push(Message::user(text));
            return;
        }
        blocks.push(ContentBlock::text(text));
        self.history.push(Message::user_blocks(blocks));
    }

    /// Record the model's reply, including any tool calls it made
    pub fn record_assistant(&mut self, response: &CompletionResponse) {
        debug!(tool_calls = response.tool_calls.len(), "ChatSession::record_assistant: called");
        if response.tool_calls.is_empty() {
            self.history.push(Message::assistant(response.text()));
            return;
        }
        let mut blocks = Vec::new();
        if !response.text().is_empty() {
            blocks.push(ContentBlock::text(response.text()));
        }
        for call in &response.tool_calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        self.history.push(Message::assistant_blocks(blocks));
    }

    /// Answer tool calls immediately
    pub fn push_tool_results(&mut self, results: Vec<ContentBlock>) {
        debug!(count = results.len(), "ChatSession::push_tool_results: called");
        self.history.push(Message::user_blocks(results));
    }

    /// Hold `results` back; `call_id` is answered once the student decides
    pub fn defer(&mut self, results: Vec<ContentBlock>, call_id: impl Into<String>) {
        let call_id = call_id.into();
        debug!(%call_id, count = results.len(), "ChatSession::defer: called");
        self.deferred = results;
        self.pending_call = Some(call_id);
    }

    /// Answer the deferred proposal call; sent with the next user turn
    pub fn settle_proposal(&mut self, accepted: bool) {
        let Some(call_id) = self.pending_call.take() else {
            return;
        };
        debug!(%call_id, %accepted, "ChatSession::settle_proposal: called");
        let outcome = if accepted {
            "The student accepted the plan update."
        } else {
            "The student declined the plan update."
        };
        self.deferred.push(ContentBlock::tool_result(call_id, outcome, false));
    }

    /// One non-streaming turn; the exchange is recorded only on success
    pub async fn send(&mut self, llm: &dyn LlmClient, text: &str) -> Result<CompletionResponse, LlmError> {
        debug!(goal_id = %self.goal_id, "ChatSession::send: called");
        let checkpoint = self.checkpoint();
        self.push_user(text);
        match llm.complete(self.request()).await {
            Ok(response) => {
                self.record_assistant(&response);
                Ok(response)
            }
            Err(e) => {
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    /// Stream a reply to the current history; the caller records it
    pub async fn stream(
        &self,
        llm: &dyn LlmClient,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError> {
        debug!(goal_id = %self.goal_id, "ChatSession::stream: called");
        llm.stream(self.request(), chunk_tx).await
    }
}
