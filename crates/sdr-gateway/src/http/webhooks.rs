//! Webhook ingress endpoint — POST /webhooks/whatsapp (§4.F).
//!
//! Validates origin (optional HMAC signature + allow-listed IPs), normalizes
//! the vendor envelope to the canonical `Message`, drops self-sent/group
//! events, persists the inbound message, and enqueues it into the buffer.
//! Always answers HTTP 200 promptly — the upstream gateway redelivers
//! on anything else, which would only amplify load (§4.F "Contract").

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use hmac::{Hmac, Mac};
use sdr_channels::{normalize_event, WebhookEnvelope};
use sdr_core::types::{Direction, Lead, Message, Phone};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

/// POST /webhooks/whatsapp
///
/// Always returns 200; failures are logged and counted, never surfaced to
/// the caller, per §4.F's redelivery-avoidance contract.
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let cfg = &state.config.webhook;

    if !cfg.allowlist_ips.is_empty() && !cfg.allowlist_ips.iter().any(|ip| ip == &peer.ip().to_string()) {
        warn!(peer = %peer, "webhook rejected: origin not allow-listed");
        return Json(json!({"ok": true}));
    }

    if let Some(secret) = cfg.secret.as_deref() {
        if let Err(reason) = verify_signature(&headers, &body, secret) {
            warn!(reason = %reason, peer = %peer, "webhook signature verification failed");
            return Json(json!({"ok": true}));
        }
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "invalid webhook JSON body");
            return Json(json!({"ok": true}));
        }
    };

    let normalized = match normalize_event(&envelope) {
        Some(n) => n,
        None => return Json(json!({"ok": true})),
    };

    if normalized.from_me {
        return Json(json!({"ok": true}));
    }

    if let Err(e) = ingest(&state, normalized).await {
        warn!(error = %e, "failed to ingest inbound webhook message");
    }

    Json(json!({"ok": true}))
}

async fn ingest(state: &AppState, normalized: sdr_channels::NormalizedMessage) -> anyhow::Result<()> {
    let phone = Phone::parse(&normalized.phone);

    let lead = state
        .store
        .get_lead_by_phone(&phone)?
        .unwrap_or_else(|| Lead::new(phone.clone()));
    let lead = if lead.name.is_none() && normalized.push_name.is_some() {
        let mut updated = lead;
        updated.name = normalized.push_name.clone();
        state.store.create_or_update_lead(&updated)?
    } else {
        state.store.create_or_update_lead(&lead)?
    };
    let conversation = state
        .store
        .get_or_create_conversation(&phone, &lead.lead_id)?;

    let message = Message {
        message_id: normalized.message_id,
        conversation_id: conversation.conversation_id,
        phone: phone.clone(),
        direction: Direction::Inbound,
        content: normalized.text,
        media_type: normalized.media_type,
        media_ref: normalized.media_ref,
        timestamp: normalized.timestamp,
    };

    let inserted = state.store.insert_message(&message)?;
    if !inserted {
        info!(external_id = %message.message_id, "duplicate inbound message ignored");
        return Ok(());
    }

    state.buffer.ingest(message).await;
    Ok(())
}

/// Verify `X-Signature-256: sha256=<hex>` against the shared webhook secret.
fn verify_signature(headers: &HeaderMap, body: &Bytes, secret: &str) -> Result<(), String> {
    let sig_header = headers
        .get("x-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Signature-256 header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_signature_accepts_matching_hmac() {
        let secret = "shh";
        let body = Bytes::from_static(b"{\"event\":\"MESSAGES_UPSERT\"}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(&body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-signature-256",
            format!("sha256={sig}").parse().unwrap(),
        );

        assert!(verify_signature(&headers, &body, secret).is_ok());
    }

    #[test]
    fn verify_signature_rejects_mismatch() {
        let body = Bytes::from_static(b"{}");
        let mut headers = HeaderMap::new();
        headers.insert("x-signature-256", "sha256=deadbeef".parse().unwrap());
        assert!(verify_signature(&headers, &body, "shh").is_err());
    }

    #[test]
    fn verify_signature_rejects_missing_header() {
        let body = Bytes::from_static(b"{}");
        let headers = HeaderMap::new();
        assert!(verify_signature(&headers, &body, "shh").is_err());
    }
}
