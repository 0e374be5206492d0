//! Persistence tools (§4.D): thin `Tool` wrappers over `sdr-store`. Store
//! calls are synchronous SQLite operations behind a mutex (see
//! `sdr_store::SqliteStore`) — fast enough to call directly from an async
//! `execute`, the same way `sdr-followup::engine` does.
//!
//! These tool names are suffixed `_record` where the CRM tools in `crm.rs`
//! already claim the bare name (`create_lead`/`update_lead`) — the model
//! sees both surfaces and needs distinct names to choose between "update
//! the CRM" and "update our local conversation-store copy".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sdr_core::types::{Direction, FollowUp, FollowUpId, FollowUpStatus, FollowUpType, Lead, LeadId, MediaType, Message, Phone};
use sdr_store::SqliteStore;
use serde::Deserialize;

use super::{IdempotencyClass, Tool, ToolResult};

fn store_result(e: sdr_store::StoreError) -> ToolResult {
    if e.is_retryable() {
        ToolResult::retryable_error(e.to_string())
    } else {
        ToolResult::error(e.to_string())
    }
}

pub struct GetLeadTool {
    store: Arc<SqliteStore>,
}

impl GetLeadTool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct GetLeadInput {
    phone: String,
}

#[async_trait]
impl Tool for GetLeadTool {
    fn name(&self) -> &str {
        "get_lead"
    }

    fn description(&self) -> &str {
        "Read the lead's local conversation-store record by phone number."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "phone": { "type": "string" } },
            "required": ["phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: GetLeadInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let phone = Phone::parse(&input.phone);
        match self.store.get_lead_by_phone(&phone) {
            Ok(Some(lead)) => ToolResult::success(serde_json::to_string(&lead).unwrap_or_default()),
            Ok(None) => ToolResult::success("not_found"),
            Err(e) => store_result(e),
        }
    }
}

pub struct CreateLeadRecordTool {
    store: Arc<SqliteStore>,
}

impl CreateLeadRecordTool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct CreateLeadRecordInput {
    phone: String,
    name: Option<String>,
}

#[async_trait]
impl Tool for CreateLeadRecordTool {
    fn name(&self) -> &str {
        "create_lead_record"
    }

    fn description(&self) -> &str {
        "Create (or fetch, if it already exists) the lead's local conversation-store record."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone": { "type": "string" },
                "name": { "type": "string" }
            },
            "required": ["phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::UniqueByKey
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: CreateLeadRecordInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let phone = Phone::parse(&input.phone);
        let mut lead = Lead::new(phone);
        lead.name = input.name;
        match self.store.create_or_update_lead(&lead) {
            Ok(lead) => ToolResult::success(serde_json::to_string(&lead).unwrap_or_default()),
            Err(e) => store_result(e),
        }
    }
}

pub struct UpdateLeadRecordTool {
    store: Arc<SqliteStore>,
}

impl UpdateLeadRecordTool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct UpdateLeadRecordInput {
    lead_id: String,
    metadata_patch: serde_json::Value,
}

#[async_trait]
impl Tool for UpdateLeadRecordTool {
    fn name(&self) -> &str {
        "update_lead_record"
    }

    fn description(&self) -> &str {
        "Shallow-merge fields into the lead's local conversation-store metadata."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": { "type": "string" },
                "metadata_patch": { "type": "object" }
            },
            "required": ["lead_id", "metadata_patch"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: UpdateLeadRecordInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let lead_id = LeadId::from(input.lead_id);
        match self.store.merge_lead_metadata(&lead_id, input.metadata_patch) {
            Ok(lead) => ToolResult::success(serde_json::to_string(&lead).unwrap_or_default()),
            Err(e) => store_result(e),
        }
    }
}

pub struct SaveMessageTool {
    store: Arc<SqliteStore>,
}

impl SaveMessageTool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct SaveMessageInput {
    conversation_id: String,
    phone: String,
    direction: String,
    content: String,
    message_id: String,
}

#[async_trait]
impl Tool for SaveMessageTool {
    fn name(&self) -> &str {
        "save_message"
    }

    fn description(&self) -> &str {
        "Persist a message to the conversation store, deduplicated by message id."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "conversation_id": { "type": "string" },
                "phone": { "type": "string" },
                "direction": { "type": "string", "enum": ["inbound", "outbound"] },
                "content": { "type": "string" },
                "message_id": { "type": "string" }
            },
            "required": ["conversation_id", "phone", "direction", "content", "message_id"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SideEffectOnce
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: SaveMessageInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let direction = match input.direction.as_str() {
            "inbound" => Direction::Inbound,
            "outbound" => Direction::Outbound,
            other => return ToolResult::error(format!("unknown direction: {other}")),
        };
        let msg = Message {
            message_id: input.message_id,
            conversation_id: input.conversation_id.into(),
            phone: Phone::parse(&input.phone),
            direction,
            content: input.content,
            media_type: MediaType::None,
            media_ref: None,
            timestamp: Utc::now(),
        };
        match self.store.insert_message(&msg) {
            Ok(true) => ToolResult::success("inserted"),
            Ok(false) => ToolResult::success("duplicate_ignored"),
            Err(e) => store_result(e),
        }
    }
}

pub struct UpdateConversationTool {
    store: Arc<SqliteStore>,
}

impl UpdateConversationTool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct UpdateConversationInput {
    phone: String,
}

#[async_trait]
impl Tool for UpdateConversationTool {
    fn name(&self) -> &str {
        "update_conversation"
    }

    fn description(&self) -> &str {
        "Touch the conversation's last-message timestamp to now."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "phone": { "type": "string" } },
            "required": ["phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: UpdateConversationInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let phone = Phone::parse(&input.phone);
        match self.store.update_conversation_last_message_at(&phone, Utc::now()) {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => store_result(e),
        }
    }
}

pub struct ScheduleFollowUpTool {
    store: Arc<SqliteStore>,
}

impl ScheduleFollowUpTool {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct ScheduleFollowUpInput {
    lead_id: String,
    kind: String,
    message_override: Option<String>,
}

#[async_trait]
impl Tool for ScheduleFollowUpTool {
    fn name(&self) -> &str {
        "schedule_follow_up"
    }

    fn description(&self) -> &str {
        "Schedule a re-engagement follow-up for the lead. No-op if one is already pending (at most one in flight per lead)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "lead_id": { "type": "string" },
                "kind": { "type": "string", "enum": ["reminder", "check_in", "reengagement", "nurture"] },
                "message_override": { "type": "string" }
            },
            "required": ["lead_id", "kind"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::UniqueByKey
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: ScheduleFollowUpInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let kind: FollowUpType = match input.kind.parse() {
            Ok(k) => k,
            Err(e) => return ToolResult::error(e),
        };
        let lead_id = LeadId::from(input.lead_id);

        match self.store.has_pending_follow_up(&lead_id) {
            Ok(true) => return ToolResult::success("already_pending"),
            Ok(false) => {}
            Err(e) => return store_result(e),
        }

        let now = Utc::now();
        let follow_up = FollowUp {
            follow_up_id: FollowUpId::new(),
            lead_id,
            kind,
            scheduled_for: now + kind.delay(),
            status: FollowUpStatus::Pending,
            attempt_number: 1,
            message_override: input.message_override,
            created_at: now,
            executed_at: None,
        };
        match self.store.insert_follow_up(&follow_up) {
            Ok(()) => ToolResult::success("scheduled"),
            Err(e) => store_result(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store"))
    }

    #[tokio::test]
    async fn get_lead_not_found_is_not_an_error() {
        let tool = GetLeadTool::new(store());
        let result = tool.execute(serde_json::json!({ "phone": "11999990000" })).await;
        assert!(!result.is_error);
        assert_eq!(result.content, "not_found");
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let s = store();
        let create = CreateLeadRecordTool::new(s.clone());
        create
            .execute(serde_json::json!({ "phone": "11999990000", "name": "Joana" }))
            .await;

        let get = GetLeadTool::new(s);
        let result = get.execute(serde_json::json!({ "phone": "11999990000" })).await;
        assert!(result.content.contains("Joana"));
    }

    #[tokio::test]
    async fn schedule_follow_up_is_idempotent_per_lead() {
        let s = store();
        let create = CreateLeadRecordTool::new(s.clone());
        let created = create
            .execute(serde_json::json!({ "phone": "11999990000" }))
            .await;
        let lead: Lead = serde_json::from_str(&created.content).unwrap();

        let tool = ScheduleFollowUpTool::new(s);
        let first = tool
            .execute(serde_json::json!({ "lead_id": lead.lead_id.as_str(), "kind": "reminder" }))
            .await;
        assert_eq!(first.content, "scheduled");

        let second = tool
            .execute(serde_json::json!({ "lead_id": lead.lead_id.as_str(), "kind": "reminder" }))
            .await;
        assert_eq!(second.content, "already_pending");
    }
}
