//! The Agent Orchestrator turn loop (§4.D): turns one `ContextBundle` into
//! a tool-enabled LLM call and back into a user-visible reply.
//!
//! `process_turn` is the only entry point. `sdr-gateway`'s webhook handler
//! calls it once per coalesced inbound message, then hands the returned
//! text to the Humanizer for paced delivery — persistence of the assistant
//! turn happens here, directly, the same way the inbound turn is persisted
//! by the caller before the context bundle is built.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use sdr_context::types::ContextBundle;
use sdr_core::config::AgentConfig;
use sdr_core::types::{Direction, MediaType, Message};
use sdr_store::SqliteStore;

use crate::prompt::PromptBuilder;
use crate::provider::{
    ChatRequest, LlmProvider, Message as ProviderMessage, ProviderError, Role,
};
use crate::thinking::ThinkingLevel;
use crate::tools::{tool_loop, Tool};

/// Overall turn budget (§5): a turn that exceeds this surfaces a fallback
/// reply even if the tool loop itself hasn't hit `max_tool_hops` yet.
const TURN_BUDGET: Duration = Duration::from_secs(25);

const FALLBACK_REPLY: &str =
    "Desculpe, tive um probleminha técnico agora. Pode repetir sua última mensagem?";

/// Result of one completed agent turn.
pub struct ProcessedMessage {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    /// Set when the turn hit `max_tool_hops`, its overall time budget, or a
    /// non-retryable provider error — `content` is then the fallback
    /// apology, not a model-authored reply (§4.D "Failure").
    pub failed: bool,
}

/// Run one full agentic turn for `ctx`.
///
/// Builds the 3-tier system prompt from `ctx`, sets the reasoning level
/// from `ctx.should_use_reasoning`, runs the tool loop bounded by
/// `config.max_tool_hops` and the overall turn budget, persists the
/// assistant's reply, and returns it.
pub async fn process_turn(
    ctx: &ContextBundle,
    store: &SqliteStore,
    provider: &dyn LlmProvider,
    tools: &[Box<dyn Tool>],
    config: &AgentConfig,
) -> ProcessedMessage {
    let prompt_builder = PromptBuilder::new();
    let system_prompt = prompt_builder.build(ctx);
    let plain = system_prompt.to_plain_text();

    let thinking = if ctx.should_use_reasoning {
        Some(ThinkingLevel::Medium)
    } else {
        None
    };

    let mut messages: Vec<ProviderMessage> = ctx
        .recent_messages
        .iter()
        .map(|m| ProviderMessage {
            role: if m.direction == Direction::Outbound {
                Role::Assistant
            } else {
                Role::User
            },
            content: m.content.clone(),
        })
        .collect();
    messages.push(ProviderMessage {
        role: Role::User,
        content: ctx.current_message.text.clone(),
    });

    let request = ChatRequest {
        model: config.model.clone(),
        system: plain,
        system_prompt: Some(system_prompt),
        messages,
        max_tokens: 4096,
        thinking,
        tools: crate::tools::to_definitions(tools),
        raw_messages: None,
    };

    let outcome = tokio::time::timeout(
        TURN_BUDGET,
        tool_loop::run_tool_loop(provider, request, tools, config.max_tool_hops),
    )
    .await;

    let (content, model, tokens_in, tokens_out, stop_reason, failed) = match outcome {
        Ok(Ok(response)) => {
            info!(
                tokens_in = response.tokens_in,
                tokens_out = response.tokens_out,
                model = %response.model,
                phone = %ctx.lead.phone,
                "agent turn complete"
            );
            (
                extract_reply(&response.content),
                response.model,
                response.tokens_in,
                response.tokens_out,
                response.stop_reason,
                false,
            )
        }
        Ok(Err(e)) => {
            warn!(error = %e, phone = %ctx.lead.phone, "agent turn failed");
            (
                fallback_for(&e),
                config.model.clone(),
                0,
                0,
                "error".to_string(),
                true,
            )
        }
        Err(_) => {
            warn!(phone = %ctx.lead.phone, "agent turn exceeded its overall budget");
            (
                FALLBACK_REPLY.to_string(),
                config.model.clone(),
                0,
                0,
                "timeout".to_string(),
                true,
            )
        }
    };

    if !content.is_empty() {
        match store.get_or_create_conversation(&ctx.lead.phone, &ctx.lead.lead_id) {
            Ok(conversation) => {
                let msg = Message {
                    message_id: Uuid::now_v7().to_string(),
                    conversation_id: conversation.conversation_id,
                    phone: ctx.lead.phone.clone(),
                    direction: Direction::Outbound,
                    content: content.clone(),
                    media_type: MediaType::None,
                    media_ref: None,
                    timestamp: chrono::Utc::now(),
                };
                if let Err(e) = store.insert_message(&msg) {
                    warn!(error = %e, "failed to persist assistant reply");
                }
            }
            Err(e) => warn!(error = %e, "failed to resolve conversation for assistant reply"),
        }
    }

    ProcessedMessage {
        content,
        model,
        tokens_in,
        tokens_out,
        stop_reason,
        failed,
    }
}

/// Probe the common reply-container shapes (§4.D "Extracting the reply")
/// in case the provider ever hands back a JSON-encoded container instead
/// of plain text; fall back to the string itself.
fn extract_reply(raw: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        for key in ["content", "message", "text", "response"] {
            if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
    }
    raw.to_string()
}

fn fallback_for(_e: &ProviderError) -> String {
    FALLBACK_REPLY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdr_context::types::CurrentMessage;
    use sdr_core::types::{EmotionalState, ExtractedEntities, Lead, Phone, QualificationProgress, Sentiment, Stage, Urgency};

    fn bundle() -> ContextBundle {
        ContextBundle {
            current_message: CurrentMessage {
                text: "Oi, quero saber sobre energia solar".to_string(),
                media_refs: vec![],
            },
            lead: Lead::new(Phone::parse("11988887777")),
            recent_messages: vec![],
            stage: Stage::InitialContact,
            qualification_progress: QualificationProgress::default(),
            emotional_state: EmotionalState {
                interest_level: 5,
                urgency: Urgency::Medium,
                sentiment: Sentiment::Neutral,
            },
            extracted: ExtractedEntities::default(),
            should_use_reasoning: false,
        }
    }

    struct StaticProvider {
        content: &'static str,
    }

    #[async_trait]
    impl LlmProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            Ok(crate::provider::ChatResponse {
                content: self.content.to_string(),
                model: "test-model".to_string(),
                tokens_in: 10,
                tokens_out: 5,
                stop_reason: "end_turn".to_string(),
                tool_calls: vec![],
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            Err(ProviderError::Parse("malformed response".to_string()))
        }
    }

    #[tokio::test]
    async fn successful_turn_persists_reply_and_returns_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        let provider = StaticProvider {
            content: "Oi! Me conta, qual o valor médio da sua conta de luz?",
        };
        let tools: Vec<Box<dyn Tool>> = vec![];
        let ctx = bundle();
        let config = AgentConfig::default();

        let result = process_turn(&ctx, &store, &provider, &tools, &config).await;
        assert!(!result.failed);
        assert!(result.content.contains("conta de luz"));

        let conv = store
            .get_or_create_conversation(&ctx.lead.phone, &ctx.lead.lead_id)
            .unwrap();
        let messages = store.get_recent_messages(&conv.conversation_id, 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Outbound);
    }

    #[tokio::test]
    async fn provider_error_surfaces_fallback_and_marks_failed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tools: Vec<Box<dyn Tool>> = vec![];
        let ctx = bundle();
        let config = AgentConfig::default();

        let result = process_turn(&ctx, &store, &FailingProvider, &tools, &config).await;
        assert!(result.failed);
        assert_eq!(result.content, FALLBACK_REPLY);
    }

    #[test]
    fn extract_reply_probes_container_shapes() {
        assert_eq!(extract_reply(r#"{"content": "hi"}"#), "hi");
        assert_eq!(extract_reply(r#"{"message": "hi"}"#), "hi");
        assert_eq!(extract_reply("plain text"), "plain text");
    }
}
