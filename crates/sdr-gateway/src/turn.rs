//! Bridges the message buffer's drained turns to the agent orchestrator
//! and back out through the humanizer.
//!
//! Kept as its own `TurnSink` implementation so `sdr-buffer` itself stays
//! agent-agnostic.

use std::sync::Arc;

use async_trait::async_trait;
use sdr_agent::provider::LlmProvider;
use sdr_agent::tools::Tool;
use sdr_buffer::{CoalescedTurn, TurnSink};
use sdr_channels::WhatsAppChannel;
use sdr_context::{ContextManager, CurrentMessage};
use sdr_core::config::AgentConfig;
use sdr_humanizer::Humanizer;
use sdr_store::SqliteStore;
use tracing::warn;

pub struct TurnHandler {
    store: Arc<SqliteStore>,
    context: Arc<ContextManager>,
    provider: Arc<dyn LlmProvider>,
    tools: Vec<Box<dyn Tool>>,
    humanizer: Arc<Humanizer>,
    channel: Arc<WhatsAppChannel>,
    config: AgentConfig,
}

impl TurnHandler {
    pub fn new(
        store: Arc<SqliteStore>,
        context: Arc<ContextManager>,
        provider: Arc<dyn LlmProvider>,
        tools: Vec<Box<dyn Tool>>,
        humanizer: Arc<Humanizer>,
        channel: Arc<WhatsAppChannel>,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            context,
            provider,
            tools,
            humanizer,
            channel,
            config,
        }
    }
}

#[async_trait]
impl TurnSink for TurnHandler {
    async fn handle_turn(&self, turn: CoalescedTurn) {
        let media_refs = turn
            .messages
            .iter()
            .filter_map(|m| m.media_ref.clone())
            .collect();
        let current_message = CurrentMessage {
            text: turn.combined_text,
            media_refs,
        };

        let ctx = match self.context.build_context(&turn.phone, current_message).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(phone = %turn.phone, error = %e, "failed to build context for turn");
                return;
            }
        };

        let is_first_message = ctx.recent_messages.is_empty();

        let processed = sdr_agent::process_turn(
            &ctx,
            &self.store,
            self.provider.as_ref(),
            &self.tools,
            &self.config,
        )
        .await;

        if processed.content.is_empty() {
            return;
        }

        let plan = self
            .humanizer
            .plan(&processed.content, &ctx.emotional_state, is_first_message);

        if let Err(e) = self.humanizer.execute(&plan, &turn.phone, self.channel.as_ref()).await {
            warn!(phone = %turn.phone, error = %e, "humanized delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sdr_agent::provider::{ChatRequest, ChatResponse, ProviderError};
    use sdr_channels::WhatsAppConfig;
    use sdr_core::config::{AgentConfig, HumanizerConfig, SessionConfig};
    use sdr_core::types::Phone;
    use sdr_store::SqliteStore;

    struct EmptyProvider;

    #[async_trait]
    impl LlmProvider for EmptyProvider {
        fn name(&self) -> &str {
            "empty"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: String::new(),
                model: "empty".to_string(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "end_turn".to_string(),
                tool_calls: vec![],
            })
        }
    }

    fn handler() -> TurnHandler {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let context = ContextManager::new(store.clone(), SessionConfig::default());
        let provider: Arc<dyn LlmProvider> = Arc::new(EmptyProvider);
        let humanizer = Arc::new(Humanizer::new(HumanizerConfig::default()));
        let channel = Arc::new(WhatsAppChannel::new(WhatsAppConfig {
            gateway_url: "http://127.0.0.1:0".to_string(),
            gateway_key: String::new(),
            instance_name: "test".to_string(),
        }));

        TurnHandler::new(store, context, provider, vec![], humanizer, channel, AgentConfig::default())
    }

    #[tokio::test]
    async fn handle_turn_returns_early_on_empty_reply() {
        let handler = handler();
        let phone = Phone::parse("11988887777");
        let turn = CoalescedTurn {
            phone: phone.clone(),
            messages: vec![],
            combined_text: "Oi".to_string(),
            started_at: Utc::now(),
            flushed_at: Utc::now(),
        };

        // An empty LLM reply must short-circuit before ever touching the
        // outbound channel, since the channel here points at nothing.
        handler.handle_turn(turn).await;
    }
}
