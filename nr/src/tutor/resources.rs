//! Search-grounded lookup of official study resources

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{AiFoundResource, UserProfile};
use crate::llm::{CompletionRequest, LlmClient, strip_json_fence};
use crate::prompts::{PromptLoader, ResourceContext};

/// At most this many suggestions are kept
const MAX_FOUND: usize = 3;

pub struct ResourceFinder {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    model: String,
}

impl ResourceFinder {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, model: impl Into<String>) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
        }
    }

    /// Up to three official resources for the goal
    ///
    /// Lookup is best-effort: any failure yields an empty list.
    pub async fn find(&self, subject: &str, goal: &str, profile: &UserProfile) -> Vec<AiFoundResource> {
        debug!(%subject, %goal, "ResourceFinder::find: called");
        let prompt = match ResourceContext::new(subject, goal, profile).and_then(|ctx| self.prompts.resources(&ctx)) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(error = %e, "Failed to render resource prompt");
                return Vec::new();
            }
        };

        let request = CompletionRequest::prompt(prompt).with_model(&self.model).with_search();
        let response = match self.llm.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Resource lookup failed");
                return Vec::new();
            }
        };

        let found = parse_found(response.text());
        info!(count = found.len(), "Resource lookup finished");
        found
    }
}

fn parse_found(reply: &str) -> Vec<AiFoundResource> {
    let body = strip_json_fence(reply);
    if !body.starts_with('[') {
        warn!("Resource finder did not return a JSON array");
        return Vec::new();
    }
    match serde_json::from_str::<Vec<AiFoundResource>>(body) {
        Ok(mut found) => {
            found.retain(|r| !r.uri.trim().is_empty());
            found.truncate(MAX_FOUND);
            found
        }
        Err(e) => {
            warn!(error = %e, "Resource finder returned malformed JSON");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionResponse;
    use crate::llm::client::mock::MockLlmClient;

    fn finder(mock: MockLlmClient) -> (ResourceFinder, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        let finder = ResourceFinder::new(mock.clone(), Arc::new(PromptLoader::embedded_only()), "fast-model");
        (finder, mock)
    }

    #[tokio::test]
    async fn test_find_parses_fenced_array() {
        let reply = "```json\n[{\"title\":\"0620 Syllabus\",\"uri\":\"https://example.org/0620\",\"description\":\"Official\"}]\n```";
        let (finder, mock) = finder(MockLlmClient::new(vec![CompletionResponse::from_text(reply)]));
        let found = finder.find("Chemistry", "Get an A", &UserProfile::dev_default()).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uri, "https://example.org/0620");

        let request = &mock.requests()[0];
        assert!(request.search);
        assert_eq!(request.model.as_deref(), Some("fast-model"));
    }

    #[tokio::test]
    async fn test_find_swallows_failures() {
        let (finder, _) = finder(MockLlmClient::scripted(vec![
            Err("offline".to_string()),
            Ok(CompletionResponse::from_text("I could not find anything.")),
            Ok(CompletionResponse::from_text("[{\"title\": 1}]")),
        ]));
        let profile = UserProfile::dev_default();
        assert!(finder.find("Chemistry", "A", &profile).await.is_empty());
        assert!(finder.find("Chemistry", "A", &profile).await.is_empty());
        assert!(finder.find("Chemistry", "A", &profile).await.is_empty());
    }

    #[test]
    fn test_parse_found_caps_results() {
        let item = |n: u32| format!(r#"{{"title":"T{n}","uri":"https://x/{n}","description":""}}"#);
        let reply = format!("[{}]", (1..=5).map(item).collect::<Vec<_>>().join(","));
        assert_eq!(parse_found(&reply).len(), 3);
    }
}
