use async_trait::async_trait;
use sdr_core::types::{FollowUpType, Lead};

use crate::error::Result;

/// Generates the short re-engagement nudge for a due follow-up (§4.E step
/// 3) when no `message_override` is set. The real implementation lives in
/// `sdr-gateway`, wired to the same LLM provider the orchestrator uses but
/// pointed at a smaller persona/model tier (§9 "Follow-up LLM persona").
#[async_trait]
pub trait FollowUpComposer: Send + Sync {
    async fn compose(&self, lead: &Lead, kind: FollowUpType) -> Result<String>;
}

/// Canned fallback composer used when no LLM persona is wired (tests, or a
/// degraded-mode deployment). Produces a ≤2-sentence nudge per hop type.
pub struct TemplateComposer;

#[async_trait]
impl FollowUpComposer for TemplateComposer {
    async fn compose(&self, lead: &Lead, kind: FollowUpType) -> Result<String> {
        let name = lead.name.clone().unwrap_or_else(|| "tudo bem".to_string());
        let text = match kind {
            FollowUpType::Reminder => {
                format!("Oi {name}, passando para saber se ficou alguma dúvida sobre a proposta de energia solar.")
            }
            FollowUpType::CheckIn => {
                format!("Oi {name}, tudo bem? Ainda faz sentido conversarmos sobre a redução na sua conta de luz?")
            }
            FollowUpType::Reengagement => {
                "Ainda por aqui! Se quiser retomar a conversa sobre energia solar, é só me chamar.".to_string()
            }
            FollowUpType::Nurture => {
                "Quando fizer sentido, seguimos à disposição para falar sobre economia na conta de luz.".to_string()
            }
        };
        Ok(text)
    }
}
