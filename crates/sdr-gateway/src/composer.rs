//! The Follow-up Scheduler's LLM persona (§9 "Follow-up LLM persona"):
//! the same `LlmProvider` the orchestrator uses, pointed at a smaller
//! model tier (`AgentConfig::followup_model`) and a one-shot prompt
//! instead of the full 3-tier system prompt a live turn gets.

use std::sync::Arc;

use async_trait::async_trait;
use sdr_agent::provider::{ChatRequest, LlmProvider, Message as ProviderMessage, Role};
use sdr_core::types::{FollowUpType, Lead};
use sdr_followup::{FollowUpComposer, FollowupError, Result};

pub struct LlmFollowUpComposer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmFollowUpComposer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self { provider, model }
    }
}

fn hop_instruction(kind: FollowUpType) -> &'static str {
    match kind {
        FollowUpType::Reminder => {
            "The lead went quiet shortly after your last message. Write one short, \
             warm nudge in Brazilian Portuguese checking if they still have questions."
        }
        FollowUpType::CheckIn => {
            "A day has passed with no reply. Write one short check-in in Brazilian \
             Portuguese, low-pressure, reopening the solar-energy conversation."
        }
        FollowUpType::Reengagement => {
            "The lead has been silent for a while. Write one brief, friendly message \
             in Brazilian Portuguese re-opening the door without pushing."
        }
        FollowUpType::Nurture => {
            "Long-silent lead, unlikely to convert soon. Write one very light-touch \
             message in Brazilian Portuguese that keeps the relationship warm."
        }
    }
}

#[async_trait]
impl FollowUpComposer for LlmFollowUpComposer {
    async fn compose(&self, lead: &Lead, kind: FollowUpType) -> Result<String> {
        let name = lead.name.clone().unwrap_or_else(|| "tudo bem?".to_string());
        let system = format!(
            "You are a solar-energy sales rep following up with {name} over WhatsApp. \
             Reply with only the message text, at most two sentences, no greeting \
             boilerplate beyond what's natural."
        );

        let request = ChatRequest {
            model: self.model.clone(),
            system: system.clone(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: hop_instruction(kind).to_string(),
            }],
            max_tokens: 256,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };

        let response = self
            .provider
            .send(&request)
            .await
            .map_err(|e| FollowupError::Compose(e.to_string()))?;

        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_agent::provider::{ChatResponse, ProviderError};
    use sdr_core::types::Phone;
    use std::sync::Mutex;

    struct FakeProvider {
        last_request: Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            *self.last_request.lock().unwrap() = Some(req.clone());
            Ok(ChatResponse {
                content: "tudo certo, posso te ajudar com isso!".to_string(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "end_turn".to_string(),
                tool_calls: vec![],
            })
        }
    }

    #[tokio::test]
    async fn compose_targets_the_followup_model_with_no_tools() {
        let provider = Arc::new(FakeProvider {
            last_request: Mutex::new(None),
        });
        let composer = LlmFollowUpComposer::new(provider.clone(), "claude-haiku".to_string());
        let lead = Lead::new(Phone::parse("11988887777"));

        let text = composer.compose(&lead, FollowUpType::CheckIn).await.unwrap();
        assert!(!text.is_empty());

        let sent = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.model, "claude-haiku");
        assert!(sent.tools.is_empty());
        assert!(sent.system_prompt.is_none());
    }

    #[test]
    fn hop_instruction_differs_per_kind() {
        let kinds = [
            FollowUpType::Reminder,
            FollowUpType::CheckIn,
            FollowUpType::Reengagement,
            FollowUpType::Nurture,
        ];
        let texts: Vec<&str> = kinds.iter().map(|k| hop_instruction(*k)).collect();
        for i in 0..texts.len() {
            for j in (i + 1)..texts.len() {
                assert_ne!(texts[i], texts[j]);
            }
        }
    }
}
