use async_trait::async_trait;

use sdr_core::types::{MediaType, Phone};

use crate::error::{ChannelError, Result};

/// Outbound capability the Humanizer and the Follow-up Scheduler send
/// through. The running system has exactly one implementation
/// (`whatsapp::WhatsAppChannel`); the trait exists so both callers, and
/// tests, can depend on the capability rather than the vendor client.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn send_text(&self, phone: &Phone, text: &str) -> Result<()>;

    async fn send_media(
        &self,
        phone: &Phone,
        media_type: MediaType,
        media_ref: &str,
        caption: Option<&str>,
    ) -> Result<()>;

    async fn send_typing_indicator(&self, phone: &Phone, on: bool) -> Result<()>;

    /// Tries base64-payload-fetch, then direct URL, then the alternative
    /// id-based endpoint, in order (§6).
    async fn download_media(&self, media_ref: &str) -> Result<Vec<u8>>;
}

pub fn config_error(msg: impl Into<String>) -> ChannelError {
    ChannelError::ConfigError(msg.into())
}
