//! The one channel adapter this system ships: a JSON-over-HTTP WhatsApp
//! gateway client (§6), plus the vendor-envelope normalization the Webhook
//! Receiver calls into (§4.F).

use async_trait::async_trait;
use base64::Engine;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use sdr_core::config::WhatsAppConfig;
use sdr_core::types::{MediaType, Phone};
use serde_json::json;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{ChannelError, Result};
use crate::types::{NormalizedMessage, WebhookEnvelope};

pub struct WhatsAppChannel {
    http: Client,
    config: WhatsAppConfig,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client build");
        Self { http, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.gateway_url.trim_end_matches('/'),
            path,
            self.config.instance_name
        )
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send_text(&self, phone: &Phone, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint("message/sendText"))
            .header("apikey", &self.config.gateway_key)
            .json(&json!({ "number": phone.to_jid(), "text": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed(format!(
                "gateway returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn send_media(
        &self,
        phone: &Phone,
        media_type: MediaType,
        media_ref: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let kind = match media_type {
            MediaType::Image => "sendMedia",
            MediaType::Audio => "sendWhatsAppAudio",
            MediaType::Document => "sendMedia",
            MediaType::None => {
                return self.send_text(phone, caption.unwrap_or_default()).await
            }
        };
        let resp = self
            .http
            .post(self.endpoint(&format!("message/{kind}")))
            .header("apikey", &self.config.gateway_key)
            .json(&json!({
                "number": phone.to_jid(),
                "media": media_ref,
                "caption": caption,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChannelError::SendFailed(format!(
                "gateway returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn send_typing_indicator(&self, phone: &Phone, on: bool) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint("chat/presence"))
            .header("apikey", &self.config.gateway_key)
            .json(&json!({
                "number": phone.to_jid(),
                "presence": if on { "composing" } else { "paused" },
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(phone = %phone, status = %resp.status(), "typing indicator rejected by gateway");
        }
        Ok(())
    }

    /// Fallback chain: base64 payload fetch, then direct URL, then the
    /// alternative id-based endpoint (§6).
    async fn download_media(&self, media_ref: &str) -> Result<Vec<u8>> {
        if let Ok(resp) = self
            .http
            .get(self.endpoint(&format!("chat/getBase64/{media_ref}")))
            .header("apikey", &self.config.gateway_key)
            .send()
            .await
        {
            if resp.status().is_success() {
                if let Ok(text) = resp.text().await {
                    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(text.trim()) {
                        return Ok(bytes);
                    }
                }
            }
        }

        if media_ref.starts_with("http://") || media_ref.starts_with("https://") {
            if let Ok(resp) = self.http.get(media_ref).send().await {
                if resp.status().is_success() {
                    if let Ok(bytes) = resp.bytes().await {
                        return Ok(bytes.to_vec());
                    }
                }
            }
        }

        let resp = self
            .http
            .get(self.endpoint(&format!("chat/media/{media_ref}")))
            .header("apikey", &self.config.gateway_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChannelError::MediaDownloadFailed(format!(
                "all download strategies exhausted for {media_ref}"
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl sdr_humanizer::OutboundGateway for WhatsAppChannel {
    async fn send_text(&self, phone: &Phone, text: &str) -> sdr_humanizer::Result<()> {
        Channel::send_text(self, phone, text)
            .await
            .map_err(|e| sdr_humanizer::HumanizerError::Gateway(e.to_string()))
    }

    async fn send_typing(&self, phone: &Phone, on: bool) -> sdr_humanizer::Result<()> {
        self.send_typing_indicator(phone, on)
            .await
            .map_err(|e| sdr_humanizer::HumanizerError::Gateway(e.to_string()))
    }
}

#[async_trait]
impl sdr_humanizer::MediaGateway for WhatsAppChannel {
    async fn send_media(
        &self,
        phone: &Phone,
        media_type: MediaType,
        media_ref: &str,
        caption: Option<&str>,
    ) -> sdr_humanizer::Result<()> {
        Channel::send_media(self, phone, media_type, media_ref, caption)
            .await
            .map_err(|e| sdr_humanizer::HumanizerError::Gateway(e.to_string()))
    }
}

/// Normalize a vendor webhook envelope to a canonical message. Returns
/// `None` for event types that don't drive the conversation, self-sent
/// events, and group-scope JIDs (`@g.us`) — all per §6/§4.F.
pub fn normalize_event(envelope: &WebhookEnvelope) -> Option<NormalizedMessage> {
    if envelope.event != "MESSAGES_UPSERT" {
        debug!(event = %envelope.event, "ignoring non-message webhook event");
        return None;
    }

    let data = &envelope.data;
    let key = data.get("key")?;
    let remote_jid = key.get("remoteJid")?.as_str()?;
    if remote_jid.ends_with("@g.us") {
        debug!("ignoring group-scope event");
        return None;
    }

    let from_me = key.get("fromMe").and_then(|v| v.as_bool()).unwrap_or(false);
    let message_id = key.get("id")?.as_str()?.to_string();
    let phone: String = remote_jid.chars().filter(|c| c.is_ascii_digit()).collect();

    let push_name = data.get("pushName").and_then(|v| v.as_str()).map(String::from);
    let ts_secs = data.get("messageTimestamp").and_then(|v| v.as_i64()).unwrap_or(0);
    let timestamp = Utc.timestamp_opt(ts_secs, 0).single().unwrap_or_else(Utc::now);

    let message = data.get("message").cloned().unwrap_or(json!({}));
    let (text, media_type, media_ref) = extract_content(&message);

    Some(NormalizedMessage {
        message_id,
        phone,
        from_me,
        timestamp,
        push_name,
        text,
        media_type,
        media_ref,
    })
}

fn extract_content(message: &serde_json::Value) -> (String, MediaType, Option<String>) {
    if let Some(text) = message.get("conversation").and_then(|v| v.as_str()) {
        return (text.to_string(), MediaType::None, None);
    }
    if let Some(ext) = message.get("extendedTextMessage") {
        let text = ext.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        return (text.to_string(), MediaType::None, None);
    }
    if let Some(img) = message.get("imageMessage") {
        let caption = img.get("caption").and_then(|v| v.as_str()).unwrap_or_default();
        let media_ref = img.get("url").and_then(|v| v.as_str()).map(String::from);
        return (caption.to_string(), MediaType::Image, media_ref);
    }
    if let Some(audio) = message.get("audioMessage") {
        let media_ref = audio.get("url").and_then(|v| v.as_str()).map(String::from);
        return (String::new(), MediaType::Audio, media_ref);
    }
    if let Some(doc) = message.get("documentMessage") {
        let caption = doc.get("caption").and_then(|v| v.as_str()).unwrap_or_default();
        let media_ref = doc.get("url").and_then(|v| v.as_str()).map(String::from);
        return (caption.to_string(), MediaType::Document, media_ref);
    }
    (String::new(), MediaType::None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ignores_group_jid() {
        let envelope = WebhookEnvelope {
            event: "MESSAGES_UPSERT".to_string(),
            instance: "solarprime".to_string(),
            data: json!({
                "key": { "remoteJid": "12345-6789@g.us", "fromMe": false, "id": "ABC" },
                "message": { "conversation": "oi" },
                "messageTimestamp": 1_700_000_000,
            }),
        };
        assert!(normalize_event(&envelope).is_none());
    }

    #[test]
    fn normalize_extracts_plain_text() {
        let envelope = WebhookEnvelope {
            event: "MESSAGES_UPSERT".to_string(),
            instance: "solarprime".to_string(),
            data: json!({
                "key": { "remoteJid": "5511988887777@s.whatsapp.net", "fromMe": false, "id": "ABC" },
                "pushName": "Maria",
                "message": { "conversation": "Oi, quero saber sobre energia solar" },
                "messageTimestamp": 1_700_000_000,
            }),
        };
        let msg = normalize_event(&envelope).unwrap();
        assert_eq!(msg.phone, "5511988887777");
        assert_eq!(msg.text, "Oi, quero saber sobre energia solar");
        assert!(!msg.from_me);
    }

    #[test]
    fn normalize_ignores_non_upsert_events() {
        let envelope = WebhookEnvelope {
            event: "CONNECTION_UPDATE".to_string(),
            instance: "solarprime".to_string(),
            data: json!({}),
        };
        assert!(normalize_event(&envelope).is_none());
    }
}
