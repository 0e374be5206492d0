use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for a Lead row (UUIDv7 — time-sortable for log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LeadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LeadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier for a Conversation row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque identifier for a FollowUp row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowUpId(pub String);

impl FollowUpId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FollowUpId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FollowUpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FollowUpId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Canonicalized phone number: digits only, country-code prefixed, no symbols.
///
/// Two `Phone` values are the same lead iff their canonical digit strings match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phone(pub String);

impl Phone {
    /// Canonicalize a raw phone string: strip everything but digits, and
    /// prefix the Brazilian country code (55) when the result looks like a
    /// bare national number (10 or 11 digits).
    pub fn parse(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let canonical = if digits.len() <= 11 && !digits.starts_with("55") {
            format!("55{digits}")
        } else {
            digits
        };
        Self(canonical)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// WhatsApp JID form used by the outbound gateway.
    pub fn to_jid(&self) -> String {
        format!("{}@s.whatsapp.net", self.0)
    }

    /// Masked form for logging — country code + last 4 digits, per the
    /// propagation rule that phone numbers are never logged in full.
    pub fn masked(&self) -> String {
        let len = self.0.len();
        if len <= 4 {
            "*".repeat(len)
        } else {
            format!("{}...{}", &self.0[..2], &self.0[len - 4..])
        }
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.masked())
    }
}

/// Position of a Lead in the sales funnel. Ordered rule set lives in
/// `sdr-context::manager::infer_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InitialContact,
    Identification,
    Qualification,
    Discovery,
    Presentation,
    ObjectionHandling,
    Scheduling,
    FollowUp,
    Qualified,
    Disqualified,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::InitialContact
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::InitialContact => "initial_contact",
            Stage::Identification => "identification",
            Stage::Qualification => "qualification",
            Stage::Discovery => "discovery",
            Stage::Presentation => "presentation",
            Stage::ObjectionHandling => "objection_handling",
            Stage::Scheduling => "scheduling",
            Stage::FollowUp => "follow_up",
            Stage::Qualified => "qualified",
            Stage::Disqualified => "disqualified",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "initial_contact" => Ok(Stage::InitialContact),
            "identification" => Ok(Stage::Identification),
            "qualification" => Ok(Stage::Qualification),
            "discovery" => Ok(Stage::Discovery),
            "presentation" => Ok(Stage::Presentation),
            "objection_handling" => Ok(Stage::ObjectionHandling),
            "scheduling" => Ok(Stage::Scheduling),
            "follow_up" => Ok(Stage::FollowUp),
            "qualified" => Ok(Stage::Qualified),
            "disqualified" => Ok(Stage::Disqualified),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// A prospective customer. Created on first inbound message; mutated only by
/// the Session/Context Manager and the agent's Persistence/CRM tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: LeadId,
    pub phone: Phone,
    pub name: Option<String>,
    pub email: Option<String>,
    pub stage: Stage,
    pub score: i32,
    /// Open key/value bag: monthly-bill-value, property-type, e_decisor,
    /// tem_usina_propria, tem_contrato_vigente, meeting_scheduled, etc.
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub external_crm_id: Option<String>,
}

impl Lead {
    pub fn new(phone: Phone) -> Self {
        let now = chrono::Utc::now();
        Self {
            lead_id: LeadId::new(),
            phone,
            name: None,
            email: None,
            stage: Stage::InitialContact,
            score: 0,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            external_crm_id: None,
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn metadata_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(|v| v.as_bool())
    }

    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }
}

/// One per phone. Invariant: exactly one Conversation per phone (see §5/§9 of
/// the engine specification — enforced at the store by an atomic upsert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: ConversationId,
    pub phone: Phone,
    pub lead_id: LeadId,
    pub last_message_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    None,
    Image,
    Audio,
    Document,
}

impl Default for MediaType {
    fn default() -> Self {
        MediaType::None
    }
}

/// A single WhatsApp message, inbound or outbound. `message_id` is assigned
/// externally by WhatsApp and is the dedup key on the receive side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub conversation_id: ConversationId,
    pub phone: Phone,
    pub direction: Direction,
    pub content: String,
    pub media_type: MediaType,
    /// Opaque descriptor resolvable by the media-analysis collaborator.
    pub media_ref: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpType {
    Reminder,
    CheckIn,
    Reengagement,
    Nurture,
}

impl FollowUpType {
    /// The hop that follows this one in the default cadence, or `None` once
    /// the sequence is exhausted.
    pub fn next_hop(self) -> Option<FollowUpType> {
        match self {
            FollowUpType::Reminder => Some(FollowUpType::CheckIn),
            FollowUpType::CheckIn => Some(FollowUpType::Reengagement),
            FollowUpType::Reengagement => Some(FollowUpType::Nurture),
            FollowUpType::Nurture => None,
        }
    }

    /// Delay after the previous event for this hop type.
    pub fn delay(self) -> chrono::Duration {
        match self {
            FollowUpType::Reminder => chrono::Duration::minutes(30),
            FollowUpType::CheckIn => chrono::Duration::hours(24),
            FollowUpType::Reengagement => chrono::Duration::hours(48),
            FollowUpType::Nurture => chrono::Duration::hours(72),
        }
    }
}

impl fmt::Display for FollowUpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FollowUpType::Reminder => "reminder",
            FollowUpType::CheckIn => "check_in",
            FollowUpType::Reengagement => "reengagement",
            FollowUpType::Nurture => "nurture",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for FollowUpType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "reminder" => Ok(FollowUpType::Reminder),
            "check_in" => Ok(FollowUpType::CheckIn),
            "reengagement" => Ok(FollowUpType::Reengagement),
            "nurture" => Ok(FollowUpType::Nurture),
            other => Err(format!("unknown follow-up type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpStatus {
    Pending,
    Executed,
    Failed,
    Skipped,
}

impl fmt::Display for FollowUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FollowUpStatus::Pending => "pending",
            FollowUpStatus::Executed => "executed",
            FollowUpStatus::Failed => "failed",
            FollowUpStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for FollowUpStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FollowUpStatus::Pending),
            "executed" => Ok(FollowUpStatus::Executed),
            "failed" => Ok(FollowUpStatus::Failed),
            "skipped" => Ok(FollowUpStatus::Skipped),
            other => Err(format!("unknown follow-up status: {other}")),
        }
    }
}

/// A durable re-engagement timer. FollowUp rows are the source of truth for
/// the scheduler; `sdr-store` is the only writer of `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUp {
    pub follow_up_id: FollowUpId,
    pub lead_id: LeadId,
    pub kind: FollowUpType,
    pub scheduled_for: chrono::DateTime<chrono::Utc>,
    pub status: FollowUpStatus,
    pub attempt_number: i32,
    pub message_override: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub executed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Derived view over a Lead's metadata — never stored separately.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QualificationProgress {
    pub high_value_bill: bool,
    pub decision_maker: bool,
    pub no_existing_system: bool,
    pub no_active_contract: bool,
    pub demonstrates_interest: bool,
    pub completion_pct: u8,
    pub next_question: Option<String>,
}

impl QualificationProgress {
    pub fn qualified(&self) -> bool {
        self.high_value_bill
            && self.decision_maker
            && self.no_existing_system
            && self.no_active_contract
            && self.demonstrates_interest
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Med,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Neg,
    Neu,
    Pos,
}

/// Derived per-turn read of the lead's emotional state. Drives the
/// Humanizer's pacing (`speed_modifier`/`pause_modifier`) and the
/// orchestrator's reasoning-mode toggle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalState {
    pub interest_level: u8,
    pub urgency: Urgency,
    pub sentiment: Sentiment,
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self {
            interest_level: 5,
            urgency: Urgency::Low,
            sentiment: Sentiment::Neu,
        }
    }
}

impl EmotionalState {
    /// Named mood bucket driving the Humanizer's speed/pause modifiers.
    pub fn mood(&self) -> &'static str {
        match (self.sentiment, self.interest_level) {
            (Sentiment::Pos, i) if i >= 7 => "enthusiastic",
            (Sentiment::Neg, _) => "empathetic",
            (_, i) if i >= 7 => "determined",
            _ => "neutral",
        }
    }
}

/// Entities parsed from inbound message history by `sdr-context`'s regex pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExtractedEntities {
    pub name: Option<String>,
    pub bill_value: Option<f64>,
    pub property_type: Option<String>,
    pub objections: Vec<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}
