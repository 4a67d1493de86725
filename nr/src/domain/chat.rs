//! Chat transcript messages

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::message_id;
use super::proposal::PlanUpdateProposal;
use super::simulation::StrategyState;
use super::strategy::StrategyResponse;
use crate::llm::{Message, MessageContent, Role, WebSource};

/// Type-specific payload of a chat message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    /// The proposed strategy awaiting review
    Strategy {
        #[serde(rename = "strategyState")]
        strategy_state: StrategyState,
        strategy: StrategyResponse,
        #[serde(default)]
        sources: Vec<WebSource>,
    },
    /// `content` holds a `data:` URL
    Image,
    PlanUpdateProposal {
        #[serde(rename = "planUpdateProposal")]
        proposal: PlanUpdateProposal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageData {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(flatten)]
    pub kind: MessageKind,
}

impl ChatMessageData {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: message_id("msg"),
            role: Role::User,
            content: content.into(),
            kind: MessageKind::Text,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: message_id("assist"),
            role: Role::Assistant,
            content: content.into(),
            kind: MessageKind::Text,
        }
    }

    /// Empty assistant bubble that streamed text fills in
    pub fn placeholder() -> Self {
        Self::assistant(String::new())
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            id: message_id("err"),
            ..Self::assistant(content)
        }
    }

    pub fn strategy_card(strategy_state: StrategyState, strategy: StrategyResponse, sources: Vec<WebSource>) -> Self {
        Self {
            id: message_id("strat"),
            role: Role::Assistant,
            content: String::new(),
            kind: MessageKind::Strategy {
                strategy_state,
                strategy,
                sources,
            },
        }
    }

    pub fn image(base64: &str) -> Self {
        Self {
            id: message_id("img"),
            role: Role::Assistant,
            content: format!("data:image/jpeg;base64,{}", base64),
            kind: MessageKind::Image,
        }
    }

    pub fn proposal_card(proposal: PlanUpdateProposal) -> Self {
        Self {
            id: message_id("proposal"),
            role: Role::Assistant,
            content: proposal.reasoning.clone(),
            kind: MessageKind::PlanUpdateProposal { proposal },
        }
    }

    pub fn is_strategy(&self) -> bool {
        matches!(self.kind, MessageKind::Strategy { .. })
    }

    pub fn is_proposal(&self) -> bool {
        matches!(self.kind, MessageKind::PlanUpdateProposal { .. })
    }
}

/// Ordered, append-only conversation, except for edit truncation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessageData>,
}

impl Transcript {
    pub fn messages(&self) -> &[ChatMessageData] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn push(&mut self, message: ChatMessageData) {
        self.messages.push(message);
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessageData> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Replace the message with `id` wholesale; false when it is gone
    pub fn replace(&mut self, id: &str, message: ChatMessageData) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    pub fn set_content(&mut self, id: &str, content: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.content = content.into();
                true
            }
            None => false,
        }
    }

    pub fn append_content(&mut self, id: &str, delta: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn remove_proposals(&mut self) {
        self.messages.retain(|m| !m.is_proposal());
    }

    /// Keep only the originally proposed strategy card
    pub fn retain_proposed_strategy(&mut self) {
        debug!(len = self.messages.len(), "Transcript::retain_proposed_strategy: called");
        let first = self.messages.iter().position(|m| m.is_strategy());
        self.messages = match first {
            Some(index) => vec![self.messages.swap_remove(index)],
            None => Vec::new(),
        };
    }

    /// Empty, or holding nothing but a strategy card
    pub fn is_fresh(&self) -> bool {
        match self.messages.as_slice() {
            [] => true,
            [only] => only.is_strategy(),
            _ => false,
        }
    }

    /// Replace a user message's text and drop everything after it
    ///
    /// Returns false when `id` is unknown or not a user message.
    pub fn edit_and_truncate(&mut self, id: &str, content: impl Into<String>) -> bool {
        debug!(%id, "Transcript::edit_and_truncate: called");
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            return false;
        };
        if self.messages[index].role != Role::User {
            return false;
        }
        self.messages.truncate(index + 1);
        self.messages[index].content = content.into();
        true
    }

    /// Text turns as model history; cards, images and empty bubbles are skipped
    ///
    /// Neighbouring turns from the same role are joined so roles alternate.
    pub fn to_history(&self) -> Vec<Message> {
        let mut history: Vec<Message> = Vec::new();
        for m in self
            .messages
            .iter()
            .filter(|m| matches!(m.kind, MessageKind::Text) && !m.content.is_empty())
        {
            if let Some(last) = history.last_mut()
                && last.role == m.role
                && let MessageContent::Text(text) = &mut last.content
            {
                text.push_str("\n\n");
                text.push_str(&m.content);
                continue;
            }
            history.push(match m.role {
                Role::User => Message::user(m.content.clone()),
                Role::Assistant => Message::assistant(m.content.clone()),
            });
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::fixtures;

    fn card() -> ChatMessageData {
        ChatMessageData::strategy_card(StrategyState::default().into_review(), fixtures::strategy(&[3]), vec![])
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(card()).unwrap();
        assert_eq!(json["type"], "strategy");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["strategyState"]["currentTitle"], "Your Strategic Pathway");

        let json = serde_json::to_value(ChatMessageData::user("hi")).unwrap();
        assert_eq!(json["type"], "text");
        assert!(json["id"].as_str().unwrap().starts_with("msg-"));

        let image = ChatMessageData::image("AAAA");
        assert_eq!(image.content, "data:image/jpeg;base64,AAAA");
    }

    #[test]
    fn test_retain_proposed_strategy() {
        let mut transcript = Transcript::default();
        let proposed = card();
        let proposed_id = proposed.id.clone();
        transcript.push(proposed);
        transcript.push(ChatMessageData::user("make M1 shorter"));
        transcript.push(ChatMessageData::assistant("{\"subject\": \"Chemistry\"}"));
        transcript.push(ChatMessageData::user("why is M2 so long?"));
        transcript.push(ChatMessageData::assistant("Stoichiometry needs practice"));

        transcript.retain_proposed_strategy();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].id, proposed_id);
        assert!(transcript.is_fresh());
    }

    #[test]
    fn test_edit_truncates_following_messages() {
        let mut transcript = Transcript::default();
        let first = ChatMessageData::user("what is a mole?");
        let first_id = first.id.clone();
        transcript.push(first);
        transcript.push(ChatMessageData::assistant("A unit"));
        transcript.push(ChatMessageData::user("thanks"));

        assert!(transcript.edit_and_truncate(&first_id, "what is molarity?"));
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].content, "what is molarity?");

        assert!(!transcript.edit_and_truncate("missing", "x"));
    }

    #[test]
    fn test_assistant_messages_are_not_editable() {
        let mut transcript = Transcript::default();
        let reply = ChatMessageData::assistant("A unit");
        let id = reply.id.clone();
        transcript.push(reply);
        assert!(!transcript.edit_and_truncate(&id, "x"));
        assert_eq!(transcript.messages()[0].content, "A unit");
    }

    #[test]
    fn test_history_skips_cards_and_empty_bubbles() {
        let mut transcript = Transcript::default();
        transcript.push(card());
        transcript.push(ChatMessageData::user("hello"));
        transcript.push(ChatMessageData::placeholder());
        transcript.push(ChatMessageData::image("AAAA"));
        transcript.push(ChatMessageData::assistant("hi there"));

        let history = transcript.to_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].text(), "hi there");
    }

    #[test]
    fn test_history_joins_turns_around_skipped_messages() {
        let mut transcript = Transcript::default();
        transcript.push(ChatMessageData::user("/image a benzene ring"));
        transcript.push(ChatMessageData::image("AAAA"));
        transcript.push(ChatMessageData::user("what are the bonds?"));
        transcript.push(ChatMessageData::assistant("Alternating double bonds"));

        let history = transcript.to_history();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
        assert_eq!(history[0].text(), "/image a benzene ring\n\nwhat are the bonds?");
    }
}
