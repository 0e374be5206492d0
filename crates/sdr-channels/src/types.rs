use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sdr_core::types::MediaType;

/// Raw vendor-shaped envelope as received on the webhook (§6). `event`
/// distinguishes `MESSAGES_UPSERT` (drives the conversation) from the
/// others (health/state updates only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub instance: String,
    pub data: serde_json::Value,
}

/// Canonical inbound event produced by `normalize_event`, narrow and
/// immutable — conversation/session linkage is added separately by the
/// Session/Context Manager, never attached to this record (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub message_id: String,
    pub phone: String,
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    pub push_name: Option<String>,
    pub text: String,
    pub media_type: MediaType,
    pub media_ref: Option<String>,
}
