//! Outbound messaging tools (§4.D): thin `Tool` wrappers over the
//! `sdr-humanizer` gateway traits already used by the Follow-up Scheduler.
//! These bypass the Humanizer's pacing — the orchestrator calls them when
//! it decides to send something mid-turn (e.g. a typing indicator while a
//! calendar lookup is in flight); the turn's final reply still goes through
//! the Humanizer on the way out (see `pipeline::process`).

use std::sync::Arc;

use async_trait::async_trait;
use sdr_core::types::{MediaType, Phone};
use sdr_humanizer::{MediaGateway, OutboundGateway};
use serde::Deserialize;

use super::{IdempotencyClass, Tool, ToolResult};

pub struct SendTextTool {
    gateway: Arc<dyn OutboundGateway>,
}

impl SendTextTool {
    pub fn new(gateway: Arc<dyn OutboundGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct SendTextInput {
    phone: String,
    text: String,
}

#[async_trait]
impl Tool for SendTextTool {
    fn name(&self) -> &str {
        "send_text"
    }

    fn description(&self) -> &str {
        "Send a WhatsApp text message to the lead's phone number."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone": { "type": "string", "description": "Lead's phone number" },
                "text": { "type": "string", "description": "Message text to send" }
            },
            "required": ["phone", "text"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SideEffectOnce
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: SendTextInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let phone = Phone::parse(&input.phone);
        match self.gateway.send_text(&phone, &input.text).await {
            Ok(()) => ToolResult::success("sent"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct SendMediaTool {
    gateway: Arc<dyn MediaGateway>,
}

impl SendMediaTool {
    pub fn new(gateway: Arc<dyn MediaGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct SendMediaInput {
    phone: String,
    media_type: String,
    media_ref: String,
    caption: Option<String>,
}

#[async_trait]
impl Tool for SendMediaTool {
    fn name(&self) -> &str {
        "send_media"
    }

    fn description(&self) -> &str {
        "Send an image, audio, document, or location to the lead."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone": { "type": "string" },
                "media_type": { "type": "string", "enum": ["image", "audio", "document"] },
                "media_ref": { "type": "string", "description": "Opaque media reference or URL" },
                "caption": { "type": "string" }
            },
            "required": ["phone", "media_type", "media_ref"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SideEffectOnce
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: SendMediaInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let media_type = match input.media_type.as_str() {
            "image" => MediaType::Image,
            "audio" => MediaType::Audio,
            "document" => MediaType::Document,
            other => return ToolResult::error(format!("unknown media_type: {other}")),
        };
        let phone = Phone::parse(&input.phone);
        match self
            .gateway
            .send_media(&phone, media_type, &input.media_ref, input.caption.as_deref())
            .await
        {
            Ok(()) => ToolResult::success("sent"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub struct SendTypingIndicatorTool {
    gateway: Arc<dyn OutboundGateway>,
}

impl SendTypingIndicatorTool {
    pub fn new(gateway: Arc<dyn OutboundGateway>) -> Self {
        Self { gateway }
    }
}

#[derive(Deserialize)]
struct TypingInput {
    phone: String,
    on: bool,
}

#[async_trait]
impl Tool for SendTypingIndicatorTool {
    fn name(&self) -> &str {
        "send_typing_indicator"
    }

    fn description(&self) -> &str {
        "Turn the WhatsApp typing indicator on or off for the lead's chat."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone": { "type": "string" },
                "on": { "type": "boolean" }
            },
            "required": ["phone", "on"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: TypingInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let phone = Phone::parse(&input.phone);
        match self.gateway.send_typing(&phone, input.on).await {
            Ok(()) => ToolResult::success("ok"),
            // A typing-indicator toggle is harmless to retry regardless of
            // cause — the gateway error type doesn't carry enough detail
            // (status, timeout vs. 4xx) to classify more precisely.
            Err(e) => ToolResult::retryable_error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::types::Phone as P;
    use std::sync::Mutex as StdMutex;

    struct FakeGateway {
        texts: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl OutboundGateway for FakeGateway {
        async fn send_text(&self, _phone: &P, text: &str) -> sdr_humanizer::Result<()> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn send_typing(&self, _phone: &P, _on: bool) -> sdr_humanizer::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_text_reports_success() {
        let gw = Arc::new(FakeGateway {
            texts: StdMutex::new(vec![]),
        });
        let tool = SendTextTool::new(gw.clone());
        let result = tool
            .execute(serde_json::json!({ "phone": "11988887777", "text": "oi" }))
            .await;
        assert!(!result.is_error);
        assert_eq!(gw.texts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_text_rejects_malformed_input() {
        let gw = Arc::new(FakeGateway {
            texts: StdMutex::new(vec![]),
        });
        let tool = SendTextTool::new(gw);
        let result = tool.execute(serde_json::json!({ "phone": 5 })).await;
        assert!(result.is_error);
    }
}
