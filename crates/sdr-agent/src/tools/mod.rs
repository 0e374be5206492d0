//! Tool system for the sales agent's tool-enabled LLM loop (§4.D).
//!
//! Defines the `Tool` trait every tool implements, its idempotency class,
//! and the six tool categories the orchestrator fans calls out to.

pub mod calendar;
pub mod crm;
pub mod media;
pub mod outbound;
pub mod persistence;
pub mod tool_loop;
pub mod utility;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
    /// Whether the tool loop's safe-retry policy should retry this failure.
    /// Only meaningful when `is_error` is true and the tool's
    /// `idempotency()` is `SafeRetry`.
    #[serde(default)]
    pub retryable: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            retryable: false,
        }
    }

    /// A failure the tool loop should not retry (validation errors, 4xx
    /// other than 429, unknown-entity errors).
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            retryable: false,
        }
    }

    /// A failure the tool loop may retry under the safe-retry backoff policy
    /// (§4.D): timeout, network error, or status in {429,500,502,503,504}.
    pub fn retryable_error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            retryable: true,
        }
    }
}

/// How the tool loop is allowed to retry or de-dup a tool's invocations (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyClass {
    /// Safe to retry on transient failure, and safe to fan out concurrently
    /// alongside other `SafeRetry` calls in the same turn.
    SafeRetry,
    /// Upgrades itself from create to update on conflict; the tool handles
    /// this internally, the loop just runs it once per call.
    UniqueByKey,
    /// Must not be retried past the network boundary. The loop de-dups
    /// identical calls via a short-lived content fingerprint.
    SideEffectOnce,
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "send_text").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Retry/dedup policy the tool loop should apply to this tool (§4.D).
    fn idempotency(&self) -> IdempotencyClass;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

/// Static catalog of all built-in tools (name, description), mirroring the
/// six categories of §4.D's tool table. Useful for `/tools`-style listing
/// without instantiating any collaborator.
pub fn tool_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        // Outbound messaging
        ("send_text", "Send a WhatsApp text message to the lead"),
        ("send_media", "Send an image, audio, document, or location to the lead"),
        ("send_typing_indicator", "Toggle the WhatsApp typing indicator"),
        // CRM
        ("search_lead", "Search the CRM for a lead by phone or name"),
        ("create_lead", "Create a new lead record in the CRM"),
        ("update_lead", "Update fields on an existing CRM lead"),
        ("move_stage", "Move a CRM lead's pipeline stage"),
        ("add_note", "Add a note to a CRM lead's timeline"),
        ("schedule_activity", "Schedule a follow-up activity on a CRM lead"),
        // Calendar
        ("check_availability", "Check open meeting slots on the sales calendar"),
        ("create_meeting", "Book a meeting with the lead"),
        ("update_meeting", "Reschedule an existing meeting"),
        ("cancel_meeting", "Cancel an existing meeting"),
        ("send_invite", "Send a calendar invite to the lead"),
        // Persistence
        ("get_lead", "Read the lead's local conversation-store record"),
        ("create_lead_record", "Create the lead's local conversation-store record"),
        ("update_lead_record", "Update the lead's local conversation-store record"),
        ("save_message", "Persist a message to the conversation store"),
        ("update_conversation", "Touch the conversation's last-message timestamp"),
        ("schedule_follow_up", "Schedule a re-engagement follow-up for the lead"),
        // Media analysis
        ("analyze_image", "Describe the contents of an inbound image"),
        ("transcribe_audio", "Transcribe an inbound voice note"),
        ("extract_document_text", "Extract text from an inbound document"),
        // Utility
        ("validate_phone", "Validate and canonicalize a phone number"),
        ("format_currency", "Format a numeric value as Brazilian currency"),
    ]
}

/// Convert a slice of tools to API-level tool definitions.
pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
