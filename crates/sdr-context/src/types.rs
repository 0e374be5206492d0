use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sdr_core::types::{EmotionalState, ExtractedEntities, Lead, Message, Phone, QualificationProgress, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Idle,
    Expired,
    Completed,
    Abandoned,
}

/// Ephemeral, in-memory per-phone session. Never written to the store —
/// only `Conversation.last_message_at` and `Lead` reflect session activity
/// durably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub phone: Phone,
    pub conversation_id: sdr_core::types::ConversationId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u32,
    /// Most recently materialized context bundle, kept for cheap resume
    /// without recomputing stage/qualification/emotional read.
    pub context_snapshot: Option<ContextBundle>,
    pub resumed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(phone: Phone, conversation_id: sdr_core::types::ConversationId) -> Self {
        let now = Utc::now();
        Self {
            phone,
            conversation_id,
            state: SessionState::Active,
            created_at: now,
            last_activity: now,
            message_count: 0,
            context_snapshot: None,
            resumed_at: None,
        }
    }
}

/// A single message, stripped of anything but what the current turn needs —
/// the coalesced text and any media references. Conversation linkage and
/// everything else enriching it lives in `ContextBundle`, never on this
/// value, so the inbound record stays narrow and immutable per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMessage {
    pub text: String,
    pub media_refs: Vec<String>,
}

/// Everything the Agent Orchestrator needs to run one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub current_message: CurrentMessage,
    pub lead: Lead,
    pub recent_messages: Vec<Message>,
    pub stage: Stage,
    pub qualification_progress: QualificationProgress,
    pub emotional_state: EmotionalState,
    pub extracted: ExtractedEntities,
    pub should_use_reasoning: bool,
}
